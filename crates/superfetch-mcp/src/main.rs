//! `superfetch`: fetch a single public web page and return LLM-ready
//! Markdown over MCP (Streamable HTTP or stdio).

mod config;
mod downloads;
mod health;
mod http;
mod mcp;
mod shutdown;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;

use config::Config;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "superfetch")]
#[command(about = "Fetch a single public web page and return LLM-ready Markdown over MCP.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP Streamable HTTP gateway.
    Serve,
    /// Run as an MCP stdio server (for editors/agents that spawn a child process).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Diagnose configuration issues without starting a server (json; no secrets).
    Doctor,
    /// Print version info.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve().await,
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            let config = Config::from_env()?;
            mcp::stdio::serve(config).await
        }
        Commands::Doctor => doctor(),
        Commands::Version => {
            println!(
                "{}",
                serde_json::json!({ "name": "superfetch", "version": env!("CARGO_PKG_VERSION") })
            );
            Ok(())
        }
    }
}

fn doctor() -> Result<()> {
    let outcome = Config::from_env();
    let report = match &outcome {
        Ok(config) => serde_json::json!({
            "ok": true,
            "host": config.host,
            "port": config.port,
            "allowRemote": config.allow_remote,
            "authMode": match config.auth_mode {
                config::AuthMode::Static => "static",
                config::AuthMode::OAuth => "oauth",
            },
            "cacheEnabled": config.cache_enabled,
            "accessTokensConfigured": !config.access_tokens.is_empty(),
            "oauthIntrospectionConfigured": config.oauth_introspection_url.is_some(),
        }),
        Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
    };
    println!("{report}");
    if outcome.is_err() {
        anyhow::bail!("configuration is invalid");
    }
    Ok(())
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(config)?;

    let rate_limiter = state.rate_limiter.clone();
    let cleanup_interval = rate_limiter.cleanup_interval();
    let rate_limiter_sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            rate_limiter.sweep();
        }
    });

    let session_store = state.session_store.clone();
    let session_cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            session_store.evict_expired(chrono::Utc::now().timestamp_millis());
        }
    });

    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "superfetch listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown::wait_for_signal());

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "server error");
        }
    });

    shutdown::run(
        state,
        shutdown::Background {
            rate_limiter_sweeper,
            session_cleanup,
        },
        async {
            let _ = server_task.await;
        },
    )
    .await;

    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_filter(filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/mcp",
            post(mcp::handle_post)
                .get(mcp::handle_get)
                .delete(mcp::handle_delete)
                .options(preflight),
        )
        .route("/mcp/downloads/:namespace/:hash", get(downloads::download))
        .layer(middleware::from_fn_with_state(state.clone(), pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// The HTTP request pipeline (spec §4.12): header validation, host/origin
/// policy, rate limiting, then CORS headers on the way back out.
async fn pipeline(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let method = request.method().clone();

    let ctx = match http::context::build_context(&headers, Some(remote)) {
        Ok(ctx) => ctx,
        Err((status, message)) => return (status, message).into_response(),
    };

    if let Err((status, message)) = http::enforce_host_origin(&state.config, &ctx) {
        return (status, message).into_response();
    }

    if method != Method::OPTIONS {
        let decision = state.rate_limiter.check(&ctx.client_ip);
        if !decision.allowed {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(serde_json::json!({
                    "error": "rate_limited",
                    "retryAfter": decision.retry_after_secs,
                })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&decision.retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            http::cors::apply(response.headers_mut(), ctx.origin.as_deref());
            return response;
        }
    }

    let mut response = next.run(request).await;
    http::cors::apply(response.headers_mut(), ctx.origin.as_deref());
    response
}
