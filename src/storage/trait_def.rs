use crate::fingerprint::VisitFingerprint;
use crate::models::{Dimension, VisitTotals};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be reached or the operation failed; callers may retry
    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Unavailable(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Expiring fingerprint markers
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns `true` when a live marker for `fingerprint` already exists.
    /// Otherwise records one expiring after `window` and returns `false`.
    ///
    /// The check and the write are a single atomic operation: of any number of
    /// concurrent callers with the same fingerprint, at most one sees `false`
    /// per window. Expired markers count as absent.
    async fn check_and_mark(
        &self,
        fingerprint: &VisitFingerprint,
        window: Duration,
    ) -> StorageResult<bool>;

    /// Physically remove expired markers. Housekeeping only: expired markers
    /// are already ignored by `check_and_mark`.
    async fn prune_expired(&self) -> StorageResult<u64>;
}

/// Increment-only aggregate counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to the counter, creating it at 1. Returns the new count.
    async fn increment(&self, dimension: &Dimension) -> StorageResult<i64>;

    /// Current value of every counter, read through the dimension index
    async fn get_totals(&self) -> StorageResult<VisitTotals>;

    /// Administrative removal of a single counter
    async fn reset(&self, dimension: &Dimension) -> StorageResult<bool>;
}

/// Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `now + window`, saturating rather than overflowing on absurd windows
pub(crate) fn expiry_millis(now_ms: i64, window: Duration) -> i64 {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(window_ms)
}
