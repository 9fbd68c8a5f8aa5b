//! Visit recording: fingerprint, deduplicate, count, report.

pub mod extract;

pub use extract::VisitorAttributes;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::fingerprint::FingerprintGenerator;
use crate::models::{DeviceClass, Dimension, VisitTotals};
use crate::storage::{CounterStore, DedupStore, StorageError};

#[derive(Debug, Error)]
pub enum VisitError {
    /// Origin token missing or wrong
    #[error("unauthorized")]
    Unauthorized,
    /// Dedup check failed; nothing was recorded
    #[error(transparent)]
    StoreUnavailable(#[from] StorageError),
    /// Marked as seen, but at least one counter increment failed
    #[error("visit counted incompletely: {0}")]
    CountIncomplete(#[source] StorageError),
    /// Visit handled, but totals could not be read back
    #[error("visit totals unavailable: {0}")]
    TotalsUnavailable(#[source] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    /// First sighting in the window; all three dimensions incremented
    Counted,
    /// Repeat within the window; nothing incremented
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitorSummary {
    pub country: String,
    pub device: DeviceClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitOutcome {
    pub status: VisitStatus,
    pub visitor: VisitorSummary,
    #[serde(flatten)]
    pub totals: VisitTotals,
}

/// Records verified visits against the dedup and counter stores.
///
/// Holds no mutable state; all coordination between concurrent requests
/// happens inside the stores.
pub struct VisitRecorder {
    dedup: Arc<dyn DedupStore>,
    counters: Arc<dyn CounterStore>,
    fingerprints: FingerprintGenerator,
    window: Duration,
}

impl VisitRecorder {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        counters: Arc<dyn CounterStore>,
        fingerprints: FingerprintGenerator,
        window: Duration,
    ) -> Self {
        Self {
            dedup,
            counters,
            fingerprints,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one verified request and return the current totals
    pub async fn record(&self, visitor: &VisitorAttributes) -> Result<VisitOutcome, VisitError> {
        let fingerprint = self
            .fingerprints
            .generate(&visitor.address, &visitor.user_agent);

        let already_seen = self
            .dedup
            .check_and_mark(&fingerprint, self.window)
            .await
            .map_err(|e| {
                error!(error = %e, "dedup check failed, visit not recorded");
                e
            })?;

        let status = if already_seen {
            debug!("repeat visit within window, not counted");
            VisitStatus::Ignored
        } else {
            self.count(visitor)
                .await
                .map_err(VisitError::CountIncomplete)?;
            VisitStatus::Counted
        };

        let totals = self.counters.get_totals().await.map_err(|e| {
            error!(error = %e, "failed to read visit totals");
            VisitError::TotalsUnavailable(e)
        })?;

        Ok(VisitOutcome {
            status,
            visitor: VisitorSummary {
                country: visitor.country.clone(),
                device: visitor.device,
            },
            totals,
        })
    }

    /// Three independent increments. A failure part-way leaves the other
    /// dimensions incremented; cross-dimension sums are not kept exact.
    async fn count(&self, visitor: &VisitorAttributes) -> Result<(), StorageError> {
        let total = Dimension::Total;
        let country = Dimension::Country(visitor.country.clone());
        let device = Dimension::Device(visitor.device);

        let (total_res, country_res, device_res) = tokio::join!(
            self.counters.increment(&total),
            self.counters.increment(&country),
            self.counters.increment(&device),
        );

        let mut first_err = None;
        for (dimension, result) in [
            (&total, total_res),
            (&country, country_res),
            (&device, device_res),
        ] {
            if let Err(e) = result {
                warn!(dimension = %dimension.key(), error = %e, "counter increment failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::VisitFingerprint;
    use crate::storage::{MemoryStorage, StorageResult};
    use async_trait::async_trait;

    fn visitor(address: &str, country: &str, device: DeviceClass) -> VisitorAttributes {
        VisitorAttributes {
            address: address.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            country: country.to_string(),
            device,
        }
    }

    fn recorder(storage: Arc<MemoryStorage>, window: Duration) -> VisitRecorder {
        VisitRecorder::new(
            storage.clone(),
            storage,
            FingerprintGenerator::default(),
            window,
        )
    }

    struct FailingDedup;

    #[async_trait]
    impl DedupStore for FailingDedup {
        async fn check_and_mark(
            &self,
            _fingerprint: &VisitFingerprint,
            _window: Duration,
        ) -> StorageResult<bool> {
            Err(StorageError::Unavailable(anyhow::anyhow!("connection refused")))
        }

        async fn prune_expired(&self) -> StorageResult<u64> {
            Ok(0)
        }
    }

    /// Counts the total, refuses every other dimension
    struct TotalOnlyCounters(MemoryStorage);

    #[async_trait]
    impl CounterStore for TotalOnlyCounters {
        async fn increment(&self, dimension: &Dimension) -> StorageResult<i64> {
            match dimension {
                Dimension::Total => self.0.increment(dimension).await,
                _ => Err(StorageError::Unavailable(anyhow::anyhow!("throttled"))),
            }
        }

        async fn get_totals(&self) -> StorageResult<VisitTotals> {
            self.0.get_totals().await
        }

        async fn reset(&self, dimension: &Dimension) -> StorageResult<bool> {
            self.0.reset(dimension).await
        }
    }

    #[tokio::test]
    async fn test_partial_count_is_reported_and_not_retried() {
        let counters = Arc::new(TotalOnlyCounters(MemoryStorage::new()));
        let recorder = VisitRecorder::new(
            Arc::new(MemoryStorage::new()),
            counters.clone(),
            FingerprintGenerator::default(),
            Duration::from_secs(60),
        );
        let v = visitor("1.2.3.4", "US", DeviceClass::Desktop);

        let first = recorder.record(&v).await;
        assert!(matches!(first, Err(VisitError::CountIncomplete(_))));

        // The marker stays, so a retry cannot count the visit twice
        let retry = recorder.record(&v).await.unwrap();
        assert_eq!(retry.status, VisitStatus::Ignored);
        assert_eq!(retry.totals.total, 1);
    }

    #[tokio::test]
    async fn test_new_visit_counts_all_dimensions() {
        let recorder = recorder(Arc::new(MemoryStorage::new()), Duration::from_secs(60));

        let outcome = recorder
            .record(&visitor("1.2.3.4", "US", DeviceClass::Desktop))
            .await
            .unwrap();

        assert_eq!(outcome.status, VisitStatus::Counted);
        assert_eq!(outcome.totals.total, 1);
        assert_eq!(outcome.totals.by_country.get("US"), Some(&1));
        assert_eq!(outcome.totals.by_device.desktop, 1);
    }

    #[tokio::test]
    async fn test_repeat_visit_is_ignored_but_reports_totals() {
        let recorder = recorder(Arc::new(MemoryStorage::new()), Duration::from_secs(60));
        let v = visitor("1.2.3.4", "US", DeviceClass::Desktop);

        recorder.record(&v).await.unwrap();
        let outcome = recorder.record(&v).await.unwrap();

        assert_eq!(outcome.status, VisitStatus::Ignored);
        assert_eq!(outcome.totals.total, 1);
    }

    #[tokio::test]
    async fn test_distinct_visitors_each_count() {
        let recorder = recorder(Arc::new(MemoryStorage::new()), Duration::from_secs(60));

        recorder
            .record(&visitor("1.1.1.1", "US", DeviceClass::Mobile))
            .await
            .unwrap();
        let outcome = recorder
            .record(&visitor("2.2.2.2", "DE", DeviceClass::Tablet))
            .await
            .unwrap();

        assert_eq!(outcome.totals.total, 2);
        assert_eq!(outcome.totals.by_country.len(), 2);
        assert_eq!(outcome.totals.by_device.mobile, 1);
        assert_eq!(outcome.totals.by_device.tablet, 1);
        assert_eq!(outcome.totals.by_device.desktop, 0);
    }

    #[tokio::test]
    async fn test_dedup_failure_fails_closed() {
        let counters = Arc::new(MemoryStorage::new());
        let recorder = VisitRecorder::new(
            Arc::new(FailingDedup),
            counters.clone(),
            FingerprintGenerator::default(),
            Duration::from_secs(60),
        );

        let result = recorder
            .record(&visitor("1.2.3.4", "US", DeviceClass::Desktop))
            .await;

        assert!(matches!(result, Err(VisitError::StoreUnavailable(_))));
        assert_eq!(counters.get_totals().await.unwrap().total, 0);
    }

    #[test]
    fn test_outcome_serializes_flat_totals() {
        let outcome = VisitOutcome {
            status: VisitStatus::Counted,
            visitor: VisitorSummary {
                country: "US".to_string(),
                device: DeviceClass::Desktop,
            },
            totals: VisitTotals::default(),
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "counted");
        assert_eq!(json["visitor"]["device"], "desktop");
        assert_eq!(json["total"], 0);
        assert!(json["by_country"].is_object());
        assert!(json["by_device"].is_object());
    }
}
