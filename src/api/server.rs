//! API server lifecycle.
//!
//! Binds the listener, mounts `api_router`, and runs axum in a
//! background tokio task. The returned handle carries the resolved
//! address and a shutdown channel; dropping the handle without
//! calling [`ApiServer::shutdown`] leaves the server running until
//! the runtime stops.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::api::types::ApiContext;

/// Handle to a running API server.
pub struct ApiServer {
    /// Resolved bind address. Differs from the requested address when
    /// the request used port 0.
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    /// Bind `addr` and serve the API in a background task.
    pub async fn start(ctx: ApiContext, addr: SocketAddr) -> std::io::Result<ApiServer> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        tracing::info!(%addr, "API server binding");

        let app = api_router(ctx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let shutdown_signal = async move {
                let _ = shutdown_rx.await;
                tracing::info!("API server received shutdown signal");
            };

            tracing::info!(%addr, "API server started");

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal)
                .await
            {
                tracing::error!("API server error: {e}");
            }

            tracing::info!("API server stopped");
        });

        Ok(ApiServer {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}
