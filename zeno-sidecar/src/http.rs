//! HTTP surface: liveness banner, health check, and the metrics WebSocket.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::gpu::GpuResolver;
use crate::sampler::Sampler;

/// Fixed liveness banner served at the root path.
pub const LIVENESS_BANNER: &str = "ZENO sidecar alive";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    resolver: Arc<GpuResolver>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

/// Create the HTTP router.
fn create_router(
    resolver: Arc<GpuResolver>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Router {
    let state = AppState {
        resolver,
        interval,
        shutdown,
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the liveness banner.
async fn root_handler() -> Response {
    (StatusCode::OK, LIVENESS_BANNER).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Upgrade to a WebSocket and stream snapshots until disconnect or
/// shutdown. Client-sent messages are never read.
async fn metrics_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_metrics(socket, state))
}

async fn stream_metrics(socket: WebSocket, state: AppState) {
    info!("Client connected to metrics stream");

    let sampler = Sampler::new(state.resolver.clone(), state.interval);
    sampler.run(socket, state.shutdown.clone()).await;

    info!("Metrics stream ended");
}

/// HTTP/WebSocket server for the sidecar.
pub struct HttpServer {
    resolver: Arc<GpuResolver>,
    interval: Duration,
}

impl HttpServer {
    pub fn new(resolver: Arc<GpuResolver>, interval: Duration) -> Self {
        Self { resolver, interval }
    }

    /// Serve on the given listener until the shutdown signal flips.
    ///
    /// Streams observe the same signal, so active connections drain
    /// promptly instead of holding the graceful shutdown open.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.resolver, self.interval, shutdown.clone());

        let addr = listener.local_addr()?;
        info!(addr = %addr, "HTTP server listening");

        let mut shutdown = shutdown;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_router() -> (Router, watch::Sender<bool>) {
        let resolver = Arc::new(GpuResolver::new(Duration::from_millis(100)));
        let (tx, rx) = watch::channel(false);
        let router = create_router(resolver, Duration::from_millis(50), rx);
        (router, tx)
    }

    #[tokio::test]
    async fn test_liveness_banner() {
        let (router, _tx) = make_router();

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], LIVENESS_BANNER.as_bytes());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (router, _tx) = make_router();

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_requires_websocket_upgrade() {
        let (router, _tx) = make_router();

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (router, _tx) = make_router();

        let response = router
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
