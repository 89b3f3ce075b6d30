//! # Forge Server
//!
//! HTTP surface for MediaForge:
//! - Job submission and status endpoints
//! - Per-provider webhook endpoints feeding the completion pipeline
//! - Health probes
//! - Graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod routes;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use routes::create_router;
pub use shutdown::shutdown_signal;
pub use state::AppState;

use std::net::SocketAddr;
use tracing::info;

/// Serve the API until a shutdown signal arrives.
///
/// # Errors
/// Returns error if the listener cannot bind or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let router = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = shutdown::shutdown_signal().await;
        })
        .await
}
