//! Background usage recorder
//!
//! Decouples usage persistence from the request path. Records go through a
//! bounded queue to a worker task; every failure inside the worker is logged
//! and absorbed so nothing can propagate back into a client response. The
//! same worker runs the retention sweep that purges expired records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::usage::{UsageRecord, UsageRepository};

const QUEUE_CAPACITY: usize = 1024;

const SWEEP_PERIOD: Duration = Duration::from_secs(3600);

/// Handle to the background usage worker. Cheap to clone; dropping every
/// handle shuts the worker down.
#[derive(Debug, Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageRecord>,
}

impl UsageRecorder {
    /// Spawn the worker task and return a handle.
    ///
    /// `retention` is the age past which records are purged.
    pub fn spawn(repository: Arc<dyn UsageRepository>, retention: chrono::Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        tokio::spawn(run_worker(repository, rx, retention));

        Self { tx }
    }

    /// Enqueue a record without waiting.
    ///
    /// A full queue drops the record with a warning; admission and the client
    /// response are never affected.
    pub fn record(&self, record: UsageRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!(error = %e, "Usage queue full, dropping record");
        }
    }
}

async fn run_worker(
    repository: Arc<dyn UsageRepository>,
    mut rx: mpsc::Receiver<UsageRecord>,
    retention: chrono::Duration,
) {
    let mut sweep = tokio::time::interval(SWEEP_PERIOD);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_record = rx.recv() => {
                match maybe_record {
                    Some(record) => {
                        if let Err(e) = repository.record(record).await {
                            warn!(error = %e, "Failed to persist usage record");
                        }
                    }
                    None => {
                        debug!("Usage recorder shutting down");
                        break;
                    }
                }
            }
            _ = sweep.tick() => {
                let cutoff = Utc::now() - retention;

                match repository.delete_before(cutoff).await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged expired usage records"),
                    Err(e) => warn!(error = %e, "Usage retention sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::{ApiKeyId, OwnerId};
    use crate::domain::usage::UsageQuery;
    use crate::infrastructure::usage::repository::InMemoryUsageRepository;

    fn record(endpoint: &str) -> UsageRecord {
        UsageRecord::new(
            ApiKeyId::from("key-1"),
            OwnerId::from("owner-1"),
            endpoint,
            "GET",
            200,
        )
    }

    async fn drain(repository: &InMemoryUsageRepository, expected: usize) -> usize {
        for _ in 0..100 {
            let count = repository.count(&UsageQuery::new()).await.unwrap();
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        repository.count(&UsageQuery::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_records_reach_repository() {
        let repository = Arc::new(InMemoryUsageRepository::default());
        let recorder = UsageRecorder::spawn(repository.clone(), chrono::Duration::days(90));

        recorder.record(record("/v1/quotes/AAPL"));
        recorder.record(record("/v1/symbols"));

        let count = drain(&repository, 2).await;
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_recorder_survives_many_records() {
        let repository = Arc::new(InMemoryUsageRepository::default());
        let recorder = UsageRecorder::spawn(repository.clone(), chrono::Duration::days(90));

        for _ in 0..100 {
            recorder.record(record("/v1/symbols"));
        }

        let count = drain(&repository, 100).await;
        assert_eq!(count, 100);
    }

    #[tokio::test]
    async fn test_startup_sweep_purges_old_records() {
        let repository = Arc::new(InMemoryUsageRepository::default());

        let old =
            record("/v1/old").with_timestamp(Utc::now() - chrono::Duration::days(120));
        repository.record(old).await.unwrap();

        // First interval tick fires immediately after spawn
        let _recorder = UsageRecorder::spawn(repository.clone(), chrono::Duration::days(90));

        for _ in 0..100 {
            if repository.count(&UsageQuery::new()).await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("retention sweep did not purge the old record");
    }
}
