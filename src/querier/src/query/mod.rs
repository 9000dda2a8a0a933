use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::model::{Matcher, Point, Series};
use common::storage::{Querier, SeriesSet, Storage, StorageError};

use error::QueryError;
use promql::parse_matchers;

pub mod error;
pub mod promql;

/// Body of `POST /query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesQuery {
    /// Vector selector, e.g. `cpu{host="a"}`
    pub promql: String,
    /// Inclusive lower time bound in milliseconds
    pub mint: i64,
    /// Inclusive upper time bound in milliseconds
    pub maxt: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub series: Vec<Series>,
}

/// Answers selector queries against a store.
#[derive(Clone)]
pub struct QueryService {
    storage: Arc<dyn Storage>,
}

impl QueryService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Select every series matching `query.promql` within `[mint, maxt]`.
    ///
    /// The read view is closed before this returns, whatever the outcome.
    #[tracing::instrument(skip_all, fields(promql = %query.promql, mint = query.mint, maxt = query.maxt))]
    pub async fn query(&self, query: &SeriesQuery) -> Result<QueryResponse, QueryError> {
        if query.mint > query.maxt {
            return Err(QueryError::InvalidTimeRange {
                mint: query.mint,
                maxt: query.maxt,
            });
        }

        let view = ReadView::open(self.storage.as_ref(), query.mint, query.maxt).await?;

        let result = materialize(&view, &query.promql).await;
        let closed = view.close();

        let series = match (result, closed) {
            (Ok(series), Ok(())) => series,
            (Ok(_), Err(e)) => {
                tracing::error!(error = %e, "Failed to close read view");
                return Err(e.into());
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::error!(error = %close_err, "Failed to close read view");
                }
                return Err(e);
            }
        };

        tracing::debug!(series = series.len(), "Query completed");

        Ok(QueryResponse { series })
    }
}

async fn materialize(view: &ReadView, selector: &str) -> Result<Vec<Series>, QueryError> {
    let matchers = parse_matchers(selector).map_err(|e| {
        tracing::warn!(error = %e, "Failed to translate selector");
        e
    })?;

    if matchers.is_empty() {
        return Ok(Vec::new());
    }

    let mut series = Vec::new();
    for stored in view.select(&matchers).await? {
        let (labels, points) = stored?.into_parts();
        series.push(Series {
            labels,
            points: points.map(Point::from).collect(),
        });
    }

    Ok(series)
}

/// An open read view that is closed on drop if not closed explicitly.
struct ReadView {
    querier: Option<Box<dyn Querier>>,
}

impl ReadView {
    async fn open(storage: &dyn Storage, mint: i64, maxt: i64) -> Result<Self, StorageError> {
        let querier = storage.querier(mint, maxt).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open read view");
            e
        })?;

        Ok(Self {
            querier: Some(querier),
        })
    }

    async fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet, StorageError> {
        match self.querier.as_ref() {
            Some(querier) => querier.select(matchers).await,
            None => Err(StorageError::Internal("read view already closed".to_string())),
        }
    }

    fn close(mut self) -> Result<(), StorageError> {
        match self.querier.take() {
            Some(querier) => querier.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ReadView {
    fn drop(&mut self) {
        if let Some(querier) = self.querier.take() {
            tracing::warn!("Read view abandoned, closing");
            if let Err(e) = querier.close() {
                tracing::error!(error = %e, "Failed to close abandoned read view");
            }
        }
    }
}
