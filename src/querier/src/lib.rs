use std::sync::Arc;

use axum::Router;
use common::storage::Storage;

pub mod endpoints;
pub mod query;

pub use query::{QueryResponse, QueryService, SeriesQuery};

/// Routes served by the querier: `POST /query`
pub fn query_router(storage: Arc<dyn Storage>) -> Router {
    endpoints::router(QueryService::new(storage))
}
