//! In-memory [`Storage`] backend.
//!
//! Committed data lives in an immutable snapshot (`Arc<SeriesMap>`). A
//! commit swaps in a new snapshot under the write lock, cloning the map
//! only while readers still hold the previous one. Queriers keep the
//! snapshot that was current when they were opened.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Appender, Querier, SeriesRef, SeriesSet, Storage, StorageError, StoredSeries};
use crate::model::{Labels, Matcher, matcher::matches_all};

/// Points of each series, ordered by timestamp.
type SeriesMap = BTreeMap<Labels, Vec<(i64, f64)>>;

#[derive(Debug, Default)]
struct Counters {
    open_appenders: AtomicUsize,
    open_queriers: AtomicUsize,
    committed_samples: AtomicU64,
}

/// Point-in-time view of the store's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub open_appenders: usize,
    pub open_queriers: usize,
    pub committed_samples: u64,
    pub series: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    head: Arc<RwLock<Arc<SeriesMap>>>,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> StorageStats {
        let series = self.head.read().await.len();
        StorageStats {
            open_appenders: self.counters.open_appenders.load(Ordering::SeqCst),
            open_queriers: self.counters.open_queriers.load(Ordering::SeqCst),
            committed_samples: self.counters.committed_samples.load(Ordering::SeqCst),
            series,
        }
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn appender(&self) -> Result<Box<dyn Appender>, StorageError> {
        self.check_open()?;
        self.counters.open_appenders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryAppender {
            storage: self.clone(),
            pending: BTreeMap::new(),
            pending_samples: 0,
        }))
    }

    async fn querier(&self, mint: i64, maxt: i64) -> Result<Box<dyn Querier>, StorageError> {
        self.check_open()?;
        let snapshot = Arc::clone(&*self.head.read().await);
        self.counters.open_queriers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryQuerier {
            storage: self.clone(),
            snapshot,
            mint,
            maxt,
        }))
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(
            open_appenders = self.counters.open_appenders.load(Ordering::SeqCst),
            open_queriers = self.counters.open_queriers.load(Ordering::SeqCst),
            "Closed in-memory storage"
        );
        Ok(())
    }
}

/// Fails if `series` already holds a different value at `timestamp`.
fn check_conflict(
    labels: &Labels,
    series: &[(i64, f64)],
    timestamp: i64,
    value: f64,
) -> Result<(), StorageError> {
    match series.binary_search_by_key(&timestamp, |(t, _)| *t) {
        Ok(idx) if series[idx].1.to_bits() != value.to_bits() => {
            Err(StorageError::DuplicateSample {
                labels: labels.clone(),
                timestamp,
            })
        }
        _ => Ok(()),
    }
}

fn series_ref(labels: &Labels) -> SeriesRef {
    let mut hasher = DefaultHasher::new();
    labels.hash(&mut hasher);
    SeriesRef(hasher.finish())
}

struct MemoryAppender {
    storage: MemoryStorage,
    pending: BTreeMap<Labels, BTreeMap<i64, f64>>,
    pending_samples: usize,
}

#[async_trait]
impl Appender for MemoryAppender {
    async fn add(
        &mut self,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef, StorageError> {
        self.storage.check_open()?;

        {
            let head = self.storage.head.read().await;
            if let Some(series) = head.get(labels) {
                check_conflict(labels, series, timestamp, value)?;
            }
        }

        let staged = self.pending.entry(labels.clone()).or_default();
        match staged.get(&timestamp) {
            Some(existing) if existing.to_bits() != value.to_bits() => {
                return Err(StorageError::DuplicateSample {
                    labels: labels.clone(),
                    timestamp,
                });
            }
            Some(_) => {}
            None => {
                staged.insert(timestamp, value);
                self.pending_samples += 1;
            }
        }

        Ok(series_ref(labels))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.storage.check_open()?;

        let pending = std::mem::take(&mut self.pending);
        let samples = std::mem::take(&mut self.pending_samples);

        let mut head = self.storage.head.write().await;

        // Another transaction may have committed since `add`; validate the
        // whole batch before touching anything.
        for (labels, points) in &pending {
            if let Some(series) = head.get(labels) {
                for (&t, &v) in points {
                    check_conflict(labels, series, t, v)?;
                }
            }
        }

        let map = Arc::make_mut(&mut *head);
        for (labels, points) in pending {
            let series = map.entry(labels).or_default();
            for (t, v) in points {
                if let Err(idx) = series.binary_search_by_key(&t, |(ts, _)| *ts) {
                    series.insert(idx, (t, v));
                }
            }
        }

        self.storage
            .counters
            .committed_samples
            .fetch_add(samples as u64, Ordering::SeqCst);
        tracing::debug!(samples, "Committed append transaction");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        let samples = std::mem::take(&mut self.pending_samples);
        self.pending.clear();
        tracing::debug!(samples, "Rolled back append transaction");
        Ok(())
    }
}

impl Drop for MemoryAppender {
    fn drop(&mut self) {
        if self.pending_samples > 0 {
            tracing::debug!(
                samples = self.pending_samples,
                "Discarding uncommitted samples"
            );
        }
        self.storage
            .counters
            .open_appenders
            .fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryQuerier {
    storage: MemoryStorage,
    snapshot: Arc<SeriesMap>,
    mint: i64,
    maxt: i64,
}

#[async_trait]
impl Querier for MemoryQuerier {
    async fn select(&self, matchers: &[Matcher]) -> Result<SeriesSet, StorageError> {
        self.storage.check_open()?;

        let mut selected = Vec::new();
        for (labels, points) in self.snapshot.iter() {
            if !matches_all(matchers, labels) {
                continue;
            }

            let start = points.partition_point(|(t, _)| *t < self.mint);
            let end = points.partition_point(|(t, _)| *t <= self.maxt);
            if start >= end {
                continue;
            }

            let in_range = points[start..end].to_vec();
            selected.push(Ok(StoredSeries::new(
                labels.clone(),
                Box::new(in_range.into_iter()),
            )));
        }

        Ok(Box::new(selected.into_iter()))
    }

    fn close(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

impl Drop for MemoryQuerier {
    fn drop(&mut self) {
        self.storage
            .counters
            .open_queriers
            .fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(host: &str) -> Labels {
        Labels::from_tags("cpu", [("host", host)]).unwrap()
    }

    async fn collect(querier: &dyn Querier, matchers: &[Matcher]) -> Vec<(Labels, Vec<(i64, f64)>)> {
        querier
            .select(matchers)
            .await
            .unwrap()
            .map(|s| {
                let (labels, points) = s.unwrap().into_parts();
                (labels, points.collect())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_commit_makes_samples_visible() {
        let storage = MemoryStorage::new();

        let mut app = storage.appender().await.unwrap();
        app.add(&cpu("a"), 2_000, 2.0).await.unwrap();
        app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        app.add(&cpu("b"), 1_000, 5.0).await.unwrap();
        app.commit().await.unwrap();

        let querier = storage.querier(0, 10_000).await.unwrap();
        let result = collect(querier.as_ref(), &[Matcher::equal("host", "a")]).await;
        assert_eq!(result, vec![(cpu("a"), vec![(1_000, 1.0), (2_000, 2.0)])]);
        querier.close().unwrap();

        let stats = storage.stats().await;
        assert_eq!(stats.committed_samples, 3);
        assert_eq!(stats.series, 2);
        assert_eq!(stats.open_appenders, 0);
        assert_eq!(stats.open_queriers, 0);
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let storage = MemoryStorage::new();

        let mut app = storage.appender().await.unwrap();
        app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        app.rollback().unwrap();

        let querier = storage.querier(i64::MIN, i64::MAX).await.unwrap();
        assert!(collect(querier.as_ref(), &[]).await.is_empty());
        assert_eq!(storage.stats().await.committed_samples, 0);
    }

    #[tokio::test]
    async fn test_dropped_appender_is_released() {
        let storage = MemoryStorage::new();
        {
            let mut app = storage.appender().await.unwrap();
            app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
            assert_eq!(storage.stats().await.open_appenders, 1);
        }
        let stats = storage.stats().await;
        assert_eq!(stats.open_appenders, 0);
        assert_eq!(stats.series, 0);
    }

    #[tokio::test]
    async fn test_view_isolation() {
        let storage = MemoryStorage::new();
        let before = storage.querier(0, 10_000).await.unwrap();

        let mut app = storage.appender().await.unwrap();
        app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        app.commit().await.unwrap();

        assert!(collect(before.as_ref(), &[]).await.is_empty());

        let after = storage.querier(0, 10_000).await.unwrap();
        assert_eq!(collect(after.as_ref(), &[]).await.len(), 1);
    }

    #[tokio::test]
    async fn test_time_bounds_are_inclusive() {
        let storage = MemoryStorage::new();
        let mut app = storage.appender().await.unwrap();
        for t in [1_000, 2_000, 3_000, 4_000] {
            app.add(&cpu("a"), t, t as f64).await.unwrap();
        }
        app.commit().await.unwrap();

        let querier = storage.querier(2_000, 3_000).await.unwrap();
        let result = collect(querier.as_ref(), &[]).await;
        assert_eq!(result[0].1, vec![(2_000, 2_000.0), (3_000, 3_000.0)]);

        let empty = storage.querier(5_000, 6_000).await.unwrap();
        assert!(collect(empty.as_ref(), &[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sample_rejected() {
        let storage = MemoryStorage::new();
        let mut app = storage.appender().await.unwrap();
        app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        app.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        let err = app.add(&cpu("a"), 1_000, 2.0).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateSample { timestamp: 1_000, .. }));
        app.commit().await.unwrap();
        assert_eq!(storage.stats().await.committed_samples, 1);

        let mut app = storage.appender().await.unwrap();
        assert!(app.add(&cpu("a"), 1_000, 3.0).await.is_err());
    }

    #[tokio::test]
    async fn test_conflicting_commit_applies_nothing() {
        let storage = MemoryStorage::new();

        let mut first = storage.appender().await.unwrap();
        let mut second = storage.appender().await.unwrap();
        first.add(&cpu("a"), 1_000, 1.0).await.unwrap();
        second.add(&cpu("b"), 1_000, 1.0).await.unwrap();
        second.add(&cpu("a"), 1_000, 9.0).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());

        let querier = storage.querier(0, 10_000).await.unwrap();
        let result = collect(querier.as_ref(), &[]).await;
        assert_eq!(result, vec![(cpu("a"), vec![(1_000, 1.0)])]);
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_new_work() {
        let storage = MemoryStorage::new();
        storage.close().await.unwrap();
        assert_eq!(storage.appender().await.err(), Some(StorageError::Closed));
        assert_eq!(storage.querier(0, 1).await.err(), Some(StorageError::Closed));
    }
}
