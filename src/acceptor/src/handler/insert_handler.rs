//! Line-protocol write handler
//!
//! Accepts newline-delimited line protocol on `POST /insert` and writes
//! every record of a request to the store in a single append transaction.
//!
//! ## Protocol Details
//!
//! - Endpoint: `POST /insert[?precision=ns|us|ms|s]`
//! - Success: `200 OK` with body `Success\n`
//! - A request is applied entirely or not at all.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use common::config::{IngestConfig, Precision};
use common::model::Sample;
use common::storage::{Appender, SeriesRef, Storage, StorageError};

use super::decoder::{DecodeError, DecodeOptions, decode_samples};

/// Response body of a successful write
pub const SUCCESS_BODY: &str = "Success\n";

/// Shared state for the insert handler
#[derive(Clone)]
pub struct InsertHandlerState {
    pub handler: Arc<InsertHandler>,
}

/// Outcome of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub samples: usize,
}

/// Handler for line-protocol writes
pub struct InsertHandler {
    storage: Arc<dyn Storage>,
    config: IngestConfig,
}

impl InsertHandler {
    pub fn new(storage: Arc<dyn Storage>, config: IngestConfig) -> Self {
        Self { storage, config }
    }

    /// Decode `body` and append all of its samples in one transaction.
    ///
    /// `precision` overrides the configured timestamp precision. The body is
    /// decoded completely before the transaction is opened, so decode errors
    /// never touch the store.
    pub async fn ingest(
        &self,
        body: &[u8],
        precision: Option<Precision>,
    ) -> Result<IngestSummary, IngestError> {
        let options = DecodeOptions::new(
            precision.unwrap_or(self.config.precision),
            self.config.non_numeric,
        );

        let samples = decode_samples(body, &options).map_err(|e| {
            tracing::warn!(error = %e, "Failed to decode line protocol");
            IngestError::Decode(e)
        })?;

        if samples.is_empty() {
            tracing::debug!("Empty write request, skipping");
            return Ok(IngestSummary { samples: 0 });
        }

        tracing::debug!(
            samples = samples.len(),
            precision = %options.precision,
            "Decoded line protocol"
        );

        let mut tx = Transaction::begin(self.storage.as_ref()).await?;

        for (idx, sample) in samples.iter().enumerate() {
            if let Err(e) = tx.add(sample).await {
                tracing::error!(
                    error = %e,
                    sample = idx,
                    labels = %sample.labels,
                    "Failed to append sample, rolling back"
                );
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "Failed to roll back append transaction");
                }
                return Err(IngestError::Storage(e));
            }
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit append transaction");
            IngestError::Storage(e)
        })?;

        tracing::info!(samples = samples.len(), "Committed write request");

        Ok(IngestSummary {
            samples: samples.len(),
        })
    }
}

/// An open append transaction that rolls back unless committed.
///
/// Dropping an unfinished transaction, e.g. when the request future is
/// cancelled, rolls it back.
struct Transaction {
    appender: Option<Box<dyn Appender>>,
}

impl Transaction {
    async fn begin(storage: &dyn Storage) -> Result<Self, IngestError> {
        let appender = storage.appender().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open append transaction");
            IngestError::Storage(e)
        })?;

        Ok(Self {
            appender: Some(appender),
        })
    }

    async fn add(&mut self, sample: &Sample) -> Result<SeriesRef, StorageError> {
        match self.appender.as_mut() {
            Some(appender) => {
                appender
                    .add(&sample.labels, sample.timestamp, sample.value)
                    .await
            }
            None => Err(StorageError::Internal(
                "append transaction already finished".to_string(),
            )),
        }
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        match self.appender.take() {
            Some(appender) => appender.commit().await,
            None => Ok(()),
        }
    }

    fn rollback(mut self) -> Result<(), StorageError> {
        match self.appender.take() {
            Some(appender) => appender.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(appender) = self.appender.take() {
            tracing::warn!("Append transaction abandoned, rolling back");
            if let Err(e) = appender.rollback() {
                tracing::error!(error = %e, "Failed to roll back abandoned append transaction");
            }
        }
    }
}

/// Errors that can occur while handling a write
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Storage(StorageError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Query string of `POST /insert`
#[derive(Debug, Default, Deserialize)]
pub struct InsertParams {
    pub precision: Option<String>,
}

/// Axum handler for POST /insert
#[tracing::instrument(skip_all, fields(body_size = body.len()))]
pub async fn handle_insert(
    State(state): State<InsertHandlerState>,
    Query(params): Query<InsertParams>,
    body: Bytes,
) -> Result<&'static str, IngestError> {
    let precision = params
        .precision
        .as_deref()
        .map(str::parse::<Precision>)
        .transpose()
        .map_err(IngestError::Malformed)?;

    state.handler.ingest(&body, precision).await?;

    Ok(SUCCESS_BODY)
}
