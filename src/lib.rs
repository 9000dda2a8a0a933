//! HTTP gateway in front of a time-series store.
//!
//! - `POST /insert` writes line protocol, all records of a request or none
//! - `POST /query` selects series with a PromQL vector selector
//! - `GET /health`

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use common::config::Configuration;
use common::storage::Storage;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the gateway's HTTP router on top of `storage`.
pub fn create_router(storage: Arc<dyn Storage>, config: &Configuration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(acceptor::insert_router(
            Arc::clone(&storage),
            config.ingest.clone(),
        ))
        .merge(querier::query_router(storage))
        .layer(DefaultBodyLimit::max(config.http.max_body_size))
        .layer(TimeoutLayer::new(config.http.request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("Shutting down http server");
        })
        .await?;

    Ok(())
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
