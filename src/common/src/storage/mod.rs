//! Interface to the backing time-series store.
//!
//! Writes go through an [`Appender`], a transaction that is either
//! committed as a whole or rolled back. Reads go through a [`Querier`], a
//! view over `[mint, maxt]` that only sees transactions committed before
//! it was opened. Both are handed out by a shared [`Storage`] handle that
//! must allow concurrent creation of appenders and queriers.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::model::{Labels, Matcher};

pub mod memory;

pub use memory::{MemoryStorage, StorageStats};

/// Opaque reference to a series inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesRef(pub u64);

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("storage is closed")]
    Closed,
    #[error("sample for {labels} at {timestamp} already exists with a different value")]
    DuplicateSample { labels: Labels, timestamp: i64 },
    #[error("storage error: {0}")]
    Internal(String),
}

/// A single append transaction.
#[async_trait]
pub trait Appender: Send {
    /// Stage one sample. Nothing is visible to readers until commit.
    async fn add(
        &mut self,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef, StorageError>;

    /// Make every staged sample visible at once.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Drop every staged sample.
    fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// One series returned by [`Querier::select`].
pub struct StoredSeries {
    labels: Labels,
    points: Box<dyn Iterator<Item = (i64, f64)> + Send>,
}

impl StoredSeries {
    pub fn new(labels: Labels, points: Box<dyn Iterator<Item = (i64, f64)> + Send>) -> Self {
        Self { labels, points }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Points in the store's native order.
    pub fn points(&mut self) -> &mut Box<dyn Iterator<Item = (i64, f64)> + Send> {
        &mut self.points
    }

    pub fn into_parts(self) -> (Labels, Box<dyn Iterator<Item = (i64, f64)> + Send>) {
        (self.labels, self.points)
    }
}

impl std::fmt::Debug for StoredSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSeries")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

pub type SeriesSet = Box<dyn Iterator<Item = Result<StoredSeries, StorageError>> + Send>;

/// A time-bounded read view.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Series matching every matcher, restricted to the view's time range.
    async fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet, StorageError>;

    /// Release the view.
    fn close(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn appender(&self) -> Result<Box<dyn Appender>, StorageError>;

    async fn querier(&self, mint: i64, maxt: i64) -> Result<Box<dyn Querier>, StorageError>;

    async fn close(&self) -> Result<(), StorageError>;
}

/// Create a store from storage configuration
pub fn create_storage(storage_config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    create_storage_from_dsn(&storage_config.dsn)
}

/// Create a store from a DSN string
pub fn create_storage_from_dsn(dsn: &str) -> Result<Arc<dyn Storage>> {
    let (scheme, _rest) = dsn
        .split_once("://")
        .ok_or_else(|| anyhow::anyhow!("Invalid storage DSN '{}': missing scheme", dsn))?;

    match scheme {
        "memory" => {
            log::info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: memory",
            scheme
        )),
    }
}
