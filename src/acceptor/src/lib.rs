pub mod handler;
pub mod line_protocol;

use std::sync::Arc;

use axum::{Router, routing::post};
use common::config::IngestConfig;
use common::storage::Storage;

use handler::{InsertHandler, InsertHandlerState, handle_insert};

/// Routes served by the acceptor: `POST /insert`
pub fn insert_router(storage: Arc<dyn Storage>, config: IngestConfig) -> Router {
    let state = InsertHandlerState {
        handler: Arc::new(InsertHandler::new(storage, config)),
    };

    Router::new()
        .route("/insert", post(handle_insert))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::storage::MemoryStorage;
    use tower::ServiceExt;

    async fn post_insert(app: Router, uri: &str, body: &'static str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_insert_success_body() {
        let storage = MemoryStorage::new();
        let app = insert_router(Arc::new(storage.clone()), IngestConfig::default());

        let (status, body) = post_insert(app, "/insert", "cpu,host=a value=1.5 1000\n").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Success\n");
        assert_eq!(storage.stats().await.committed_samples, 1);
    }

    #[tokio::test]
    async fn test_insert_malformed_body() {
        let storage = MemoryStorage::new();
        let app = insert_router(Arc::new(storage.clone()), IngestConfig::default());

        let (status, body) = post_insert(app, "/insert", "cpu,host=a\n").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("line 1"));
        assert_eq!(storage.stats().await.committed_samples, 0);
    }

    #[tokio::test]
    async fn test_insert_unknown_precision() {
        let app = insert_router(Arc::new(MemoryStorage::new()), IngestConfig::default());

        let (status, body) = post_insert(app, "/insert?precision=h", "cpu v=1 1\n").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("unsupported precision 'h'"));
    }

    #[tokio::test]
    async fn test_insert_requires_post() {
        let app = insert_router(Arc::new(MemoryStorage::new()), IngestConfig::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/insert")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
