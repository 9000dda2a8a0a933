use axum::{Json, body::Bytes, extract::State, routing::post, Router};

use crate::query::{QueryResponse, QueryService, SeriesQuery, error::QueryError};

pub fn router(service: QueryService) -> Router {
    Router::new()
        .route("/query", post(query_series))
        .with_state(service)
}

/// POST /query
///
/// Body: `{"promql": "<selector>", "mint": <ms>, "maxt": <ms>}`. The body is
/// decoded as JSON regardless of its content type.
#[tracing::instrument(skip_all, fields(body_size = body.len()))]
pub async fn query_series(
    State(service): State<QueryService>,
    body: Bytes,
) -> Result<Json<QueryResponse>, QueryError> {
    let query: SeriesQuery = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to decode query request");
        QueryError::Malformed(e.to_string())
    })?;

    let response = service.query(&query).await?;

    Ok(Json(response))
}
