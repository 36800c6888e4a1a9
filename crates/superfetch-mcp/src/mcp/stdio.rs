//! Stdio MCP transport (spec §4.11 "stdio transport"), feature-gated `stdio`.
//!
//! One process, one client, no session gateway: `rmcp` owns framing over
//! stdin/stdout and we expose a single `fetch-url` tool backed by the same
//! pipeline the HTTP gateway uses.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::mcp::tool::FetchUrlInput;
use crate::state::AppState;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FetchUrlArgs {
    pub url: String,
    #[serde(default)]
    pub skip_noise_removal: bool,
    #[serde(default)]
    pub force_refresh: bool,
    pub max_inline_chars: Option<usize>,
}

fn tool_result(value: serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

#[derive(Clone)]
pub struct SuperfetchStdio {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

#[tool_router]
impl SuperfetchStdio {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            state,
        }
    }

    #[tool(description = "Fetch a single public web page and return LLM-ready Markdown.")]
    async fn fetch_url(
        &self,
        params: Parameters<FetchUrlArgs>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0;
        let input = FetchUrlInput {
            url: args.url,
            skip_noise_removal: args.skip_noise_removal,
            force_refresh: args.force_refresh,
            max_inline_chars: args.max_inline_chars,
        };
        let (payload, is_error, _resource_link) = crate::mcp::tool::run(&self.state, input).await;
        if is_error {
            return Err(McpError::internal_error(payload.to_string(), None));
        }
        Ok(tool_result(payload))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SuperfetchStdio {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Fetch a single public web page and return LLM-ready Markdown with metadata."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(config)?;
    let svc = SuperfetchStdio::new(state);
    let running = svc
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}
