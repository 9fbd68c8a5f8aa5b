use crate::models::{Dimension, VisitTotals};
use crate::storage::{CounterStore, StorageResult};
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_KEY: &str = "totals";

/// Totals read from the backing store, tagged with the local write
/// generation current when the read started.
#[derive(Debug, Clone)]
struct Snapshot {
    generation: u64,
    totals: VisitTotals,
}

impl Snapshot {
    fn supersedes(&self, other: &Snapshot) -> bool {
        self.generation > other.generation
            || (self.generation == other.generation && self.totals.total >= other.totals.total)
    }
}

/// Counter store wrapper that keeps the last totals snapshot in memory.
///
/// Shields the backing store from read spikes: most requests are repeat
/// visits that only read totals. Every increment made through this wrapper
/// bumps a generation counter, and a snapshot is only served while its
/// generation is current, so an instance never serves totals older than its
/// own last counted visit. A slow read that finishes after a newer snapshot
/// was stored never replaces it. Increments made by other instances show up
/// once the snapshot expires.
pub struct CachedCounterStore {
    inner: Arc<dyn CounterStore>,
    snapshot: Cache<&'static str, Snapshot>,
    generation: AtomicU64,
}

impl CachedCounterStore {
    pub fn new(inner: Arc<dyn CounterStore>, ttl: Duration) -> Self {
        let snapshot = Cache::builder()
            .max_capacity(1)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            snapshot,
            generation: AtomicU64::new(0),
        }
    }

    async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.snapshot.invalidate(SNAPSHOT_KEY).await;
    }
}

#[async_trait]
impl CounterStore for CachedCounterStore {
    async fn increment(&self, dimension: &Dimension) -> StorageResult<i64> {
        let count = self.inner.increment(dimension).await?;
        self.invalidate().await;
        Ok(count)
    }

    async fn get_totals(&self) -> StorageResult<VisitTotals> {
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(cached) = self.snapshot.get(SNAPSHOT_KEY).await {
            if cached.generation == generation {
                tracing::trace!("totals served from cache");
                return Ok(cached.totals);
            }
        }

        let fresh = Snapshot {
            generation,
            totals: self.inner.get_totals().await?,
        };
        let fallback = fresh.totals.clone();

        // Keep whichever snapshot is newer; a read that started before a
        // local increment must not overwrite what was stored after it
        let result = self
            .snapshot
            .entry(SNAPSHOT_KEY)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if !fresh.supersedes(entry.value()) => Op::Nop,
                    _ => Op::Put(fresh),
                };
                std::future::ready(op)
            })
            .await;

        let totals = match result {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry) => entry.into_value().totals,
            CompResult::Removed(_) | CompResult::StillNone(_) => fallback,
        };

        Ok(totals)
    }

    async fn reset(&self, dimension: &Dimension) -> StorageResult<bool> {
        let removed = self.inner.reset(dimension).await?;
        self.invalidate().await;
        Ok(removed)
    }
}
