//! HTTP server lifecycle: bind → spawn background task → return handle
//! with shutdown channel.

use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::build_router;
use crate::api::types::ApiContext;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind API server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to get server address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Metadata for a running server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub server_addr: String,
    pub port: u16,
    pub started_at: String,
}

/// Handle to a running API server.
pub struct ApiServer {
    pub info: ServerInfo,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ApiServer {
    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait until the server task has finished.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}

/// Bind `addr` (port 0 picks an ephemeral port), build the router and spawn
/// the axum server in a background tokio task.
pub async fn start_server(ctx: ApiContext, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = build_router(ctx);
    let info = ServerInfo {
        server_addr: addr.to_string(),
        port: addr.port(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
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
        info,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::services::{MockAssessmentClient, MockDispatchClient};

    fn test_ctx() -> ApiContext {
        ApiContext::for_tests(
            Arc::new(MockAssessmentClient::new("ok")),
            Arc::new(MockDispatchClient::ok()),
        )
    }

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let mut server = start_server(test_ctx(), loopback())
            .await
            .expect("server should start");
        assert!(server.info.port > 0);
        assert!(server.info.server_addr.contains(':'));

        let url = format!("http://127.0.0.1:{}/api/health", server.info.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.wait())
            .await
            .expect("server should stop after shutdown");
    }

    #[tokio::test]
    async fn server_serves_api_routes() {
        let mut server = start_server(test_ctx(), loopback())
            .await
            .expect("server should start");
        let port = server.info.port;

        let url = format!("http://127.0.0.1:{port}/nonexistent");
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let resp = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/api/sessions"))
            .header("X-Remedi-User-Id", "patient-1")
            .header("X-Remedi-User-Email", "ada@example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server.shutdown();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let mut first = start_server(test_ctx(), loopback()).await.unwrap();
        let taken = SocketAddr::from(([127, 0, 0, 1], first.info.port));
        let err = start_server(test_ctx(), taken).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut server = start_server(test_ctx(), loopback()).await.unwrap();
        server.shutdown();
        server.shutdown(); // Second call should be safe
    }
}
