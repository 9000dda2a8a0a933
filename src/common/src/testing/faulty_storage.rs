//! A [`Storage`] wrapper that injects failures into an in-memory store.

use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Labels, Matcher};
use crate::storage::{
    Appender, MemoryStorage, Querier, SeriesRef, SeriesSet, Storage, StorageError,
};

/// Which operations should fail.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail the n-th `add` (1-based) of every transaction
    pub fail_add_at: Option<usize>,
    pub fail_commit: bool,
    pub fail_select: bool,
    /// Sleep before every `add`
    pub add_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct FaultyStorage {
    inner: MemoryStorage,
    faults: Faults,
}

impl FaultyStorage {
    pub fn new(faults: Faults) -> Self {
        Self {
            inner: MemoryStorage::new(),
            faults,
        }
    }

    /// The wrapped store, for inspecting what actually got committed.
    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Internal(format!("injected failure: {what}"))
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn appender(&self) -> Result<Box<dyn Appender>, StorageError> {
        Ok(Box::new(FaultyAppender {
            inner: self.inner.appender().await?,
            faults: self.faults.clone(),
            adds: 0,
        }))
    }

    async fn querier(&self, mint: i64, maxt: i64) -> Result<Box<dyn Querier>, StorageError> {
        Ok(Box::new(FaultyQuerier {
            inner: self.inner.querier(mint, maxt).await?,
            fail_select: self.faults.fail_select,
        }))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.close().await
    }
}

struct FaultyAppender {
    inner: Box<dyn Appender>,
    faults: Faults,
    adds: usize,
}

#[async_trait]
impl Appender for FaultyAppender {
    async fn add(
        &mut self,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef, StorageError> {
        if let Some(delay) = self.faults.add_delay {
            tokio::time::sleep(delay).await;
        }

        self.adds += 1;
        if self.faults.fail_add_at == Some(self.adds) {
            return Err(injected(&format!("add #{}", self.adds)));
        }
        self.inner.add(labels, timestamp, value).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if self.faults.fail_commit {
            return Err(injected("commit"));
        }
        self.inner.commit().await
    }

    fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback()
    }
}

struct FaultyQuerier {
    inner: Box<dyn Querier>,
    fail_select: bool,
}

#[async_trait]
impl Querier for FaultyQuerier {
    async fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet, StorageError> {
        if self.fail_select {
            return Err(injected("select"));
        }
        self.inner.select(matchers).await
    }

    fn close(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.close()
    }
}
