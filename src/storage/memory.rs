use crate::fingerprint::VisitFingerprint;
use crate::models::{CounterRow, DedupRecord, Dimension, VisitTotals};
use crate::storage::trait_def::{expiry_millis, now_millis};
use crate::storage::{CounterStore, DedupStore, StorageResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

/// In-process store for development and tests.
///
/// Each `DashMap` entry is locked for the duration of an entry operation,
/// which gives the same single-key atomicity the SQL backends get from
/// their conditional upserts.
#[derive(Default)]
pub struct MemoryStorage {
    locks: DashMap<String, DedupRecord>,
    counters: DashMap<String, CounterRow>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers physically present, expired or not
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

#[async_trait]
impl DedupStore for MemoryStorage {
    async fn check_and_mark(
        &self,
        fingerprint: &VisitFingerprint,
        window: Duration,
    ) -> StorageResult<bool> {
        let now = now_millis();
        let record = DedupRecord {
            fingerprint: fingerprint.as_str().to_string(),
            recorded_at: now,
            expires_at: expiry_millis(now, window),
        };

        match self.locks.entry(record.fingerprint.clone()) {
            Entry::Occupied(entry) if entry.get().is_live(now) => Ok(true),
            Entry::Occupied(mut entry) => {
                entry.insert(record);
                Ok(false)
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(false)
            }
        }
    }

    async fn prune_expired(&self) -> StorageResult<u64> {
        let now = now_millis();
        let before = self.locks.len();
        self.locks.retain(|_, record| record.is_live(now));
        Ok(before.saturating_sub(self.locks.len()) as u64)
    }
}

#[async_trait]
impl CounterStore for MemoryStorage {
    async fn increment(&self, dimension: &Dimension) -> StorageResult<i64> {
        let mut row = self
            .counters
            .entry(dimension.key())
            .or_insert_with(|| CounterRow {
                dimension: dimension.kind().to_string(),
                label: dimension.label().to_string(),
                count: 0,
            });
        row.count += 1;
        Ok(row.count)
    }

    async fn get_totals(&self) -> StorageResult<VisitTotals> {
        let rows: Vec<CounterRow> = self
            .counters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        Ok(VisitTotals::from_rows(rows))
    }

    async fn reset(&self, dimension: &Dimension) -> StorageResult<bool> {
        Ok(self.counters.remove(&dimension.key()).is_some())
    }
}
