//! Graceful shutdown sequencing (spec §5 "Shutdown sequence").
//!
//! Order matters: stop producing new rate-limit/session bookkeeping before
//! tearing down the things that bookkeeping protects, and close the worker
//! pool last so in-flight transforms get a chance to finish or time out on
//! their own.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::state::AppState;

pub struct Background {
    pub rate_limiter_sweeper: JoinHandle<()>,
    pub session_cleanup: JoinHandle<()>,
}

pub async fn wait_for_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}

/// Runs the shutdown sequence. `server` resolves once the listening socket has
/// stopped accepting new connections (axum's graceful-shutdown future).
pub async fn run(state: Arc<AppState>, background: Background, server: impl std::future::Future<Output = ()>) {
    info!("shutdown: stopping rate limiter sweeper");
    background.rate_limiter_sweeper.abort();

    info!("shutdown: stopping session cleanup loop");
    background.session_cleanup.abort();

    info!("shutdown: draining inbound connections");
    server.await;

    info!("shutdown: closing all sessions");
    let closed = state.session_store.clear();
    for record in &closed {
        state.registry.remove(&record.id).await;
    }

    info!(sessions_closed = closed.len(), "shutdown: worker pool draining");
    // WorkerPool has no explicit close handle; its tasks hold only Arc
    // references and exit once the last Arc<WorkerPool> (held here and by
    // every in-flight submit()) is dropped.
    drop(state);

    info!("shutdown: complete");
}
