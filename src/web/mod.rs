//! Web server module.

mod handlers;

pub use handlers::*;

use crate::aggregate::{Aggregator, SnapshotCache};
use crate::config::ServerConfig;
use crate::db::Store;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Upper bound on producing a response.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Request ids for requests that arrive without an `X-Request-Id`.
#[derive(Clone, Default)]
struct NextRequestId {
    next: Arc<AtomicU64>,
}

impl MakeRequestId for NextRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        HeaderValue::from_str(&id.to_string()).ok().map(RequestId::new)
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<SnapshotCache>,
}

/// Web server for the status dashboard.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        store: Arc<Store>,
        aggregator: Arc<Aggregator>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                store,
                aggregator,
                cache,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "request",
                id = %request_id,
                method = %request.method(),
                path = %request.uri().path(),
            )
        });

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_dashboard))
            // API endpoints
            .route("/api/status", get(handlers::handle_status))
            .route("/api/latest/raw", get(handlers::handle_latest_raw))
            .route("/api/snapshot", get(handlers::handle_snapshot))
            .route("/api/days/{date}", get(handlers::handle_day))
            // Static assets
            .route("/favicon.ico", get(handlers::handle_favicon))
            // Anything else goes back to the dashboard
            .fallback(handlers::handle_fallback)
            .layer(cors)
            .layer(TimeoutLayer::new(RESPONSE_TIMEOUT))
            // Later layers wrap earlier ones: the id is set before tracing and echoed on the way out.
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(trace)
            .layer(SetRequestIdLayer::x_request_id(NextRequestId::default()))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn_server(tmp: &NamedTempFile) -> SocketAddr {
        let config = ServerConfig::default();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let aggregator = Arc::new(Aggregator::new(store.clone(), &config.service_id));
        let server = Server::new(config, store, aggregator, Arc::new(SnapshotCache::new()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = server.routes();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn get(addr: SocketAddr, path: &str, headers: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\n{}Connection: close\r\n\r\n",
            path, headers
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).to_lowercase()
    }

    #[tokio::test]
    async fn test_unknown_path_redirects_home() {
        let tmp = NamedTempFile::new().unwrap();
        let addr = spawn_server(&tmp).await;

        let response = get(addr, "/no/such/page", "").await;
        assert!(response.starts_with("http/1.1 301"), "{}", response);
        assert!(response.contains("location: /\r\n"));
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let tmp = NamedTempFile::new().unwrap();
        let addr = spawn_server(&tmp).await;

        let response = get(addr, "/api/status", "X-Request-Id: abc-123\r\n").await;
        assert!(response.starts_with("http/1.1 200"), "{}", response);
        assert!(response.contains("x-request-id: abc-123\r\n"));
    }

    #[tokio::test]
    async fn test_request_id_is_assigned() {
        let tmp = NamedTempFile::new().unwrap();
        let addr = spawn_server(&tmp).await;

        let first = get(addr, "/favicon.ico", "").await;
        let second = get(addr, "/favicon.ico", "").await;
        assert!(first.contains("x-request-id: 1\r\n"), "{}", first);
        assert!(second.contains("x-request-id: 2\r\n"), "{}", second);
    }

    #[tokio::test]
    async fn test_status_without_data_is_unknown() {
        let tmp = NamedTempFile::new().unwrap();
        let addr = spawn_server(&tmp).await;

        let response = get(addr, "/api/status", "").await;
        assert!(response.contains(r#""status":"unknown""#), "{}", response);
        assert!(response.contains(r#""time_ago":"unknown""#), "{}", response);
    }
}
