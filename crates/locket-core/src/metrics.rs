// Metrics module for observability
// Expiration counters and live lock gauges, published through the `metrics` facade

use std::sync::Arc;
use std::time::Duration;

use locket_common::{Clock, LOCK_TYPE, PRESENCE_TYPE};
use locket_persistence::LockDb;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use tokio::sync::broadcast;
use tracing::{error, info};

pub const LOCKS_EXPIRED: &str = "LocksExpired";
pub const PRESENCE_EXPIRED: &str = "PresenceExpired";
pub const ACTIVE_LOCKS: &str = "ActiveLocks";
pub const ACTIVE_PRESENCES: &str = "ActivePresences";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(LOCKS_EXPIRED, "Total number of locks released by TTL expiry");
    describe_counter!(
        PRESENCE_EXPIRED,
        "Total number of presences released by TTL expiry"
    );
    describe_gauge!(ACTIVE_LOCKS, "Current number of held locks");
    describe_gauge!(ACTIVE_PRESENCES, "Current number of held presences");

    tracing::info!("Metrics initialized");
}

/// Record a lock released by expiry
pub fn record_lock_expired() {
    counter!(LOCKS_EXPIRED).increment(1);
}

/// Record a presence released by expiry
pub fn record_presence_expired() {
    counter!(PRESENCE_EXPIRED).increment(1);
}

/// Update live lock and presence counts
pub fn set_active_counts(locks: f64, presences: f64) {
    gauge!(ACTIVE_LOCKS).set(locks);
    gauge!(ACTIVE_PRESENCES).set(presences);
}

/// Periodically publishes the number of held locks and presences
pub struct MetricsNotifier {
    db: Arc<dyn LockDb>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl MetricsNotifier {
    pub fn new(db: Arc<dyn LockDb>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            db,
            clock,
            interval,
        }
    }

    /// Run until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "metrics-notifier-started");
        let mut ticker = self.clock.new_ticker(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.publish().await,
                _ = shutdown.recv() => break,
            }
        }
        info!("metrics-notifier-stopped");
    }

    async fn publish(&self) {
        let locks = match self.db.count(LOCK_TYPE).await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "failed-to-count-locks");
                return;
            }
        };
        let presences = match self.db.count(PRESENCE_TYPE).await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "failed-to-count-presences");
                return;
            }
        };

        set_active_counts(locks as f64, presences as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use locket_common::{FakeClock, LocketError};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;
    use crate::testing::{FakeLockDb, eventually};

    fn gauges(snapshotter: &metrics_util::debugging::Snapshotter) -> HashMap<String, f64> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Gauge(v) => Some((key.key().name().to_string(), v.into_inner())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_publishes_active_counts_on_tick() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let db = Arc::new(FakeLockDb::default());
                db.count_for_type(LOCK_TYPE, 3);
                db.count_for_type(PRESENCE_TYPE, 2);
                let clock = FakeClock::new(Utc::now());
                let notifier =
                    MetricsNotifier::new(db.clone(), Arc::new(clock.clone()), Duration::from_secs(10));
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
                let handle = tokio::spawn(notifier.run(shutdown_rx));

                clock
                    .wait_for_watcher_and_increment(Duration::from_secs(10))
                    .await;
                eventually(|| db.count_args().len() == 2).await;

                let _ = shutdown_tx.send(());
                handle.await.unwrap();
            })
        });

        let gauges = gauges(&snapshotter);
        assert_eq!(gauges.get(ACTIVE_LOCKS), Some(&3.0));
        assert_eq!(gauges.get(ACTIVE_PRESENCES), Some(&2.0));
    }

    #[tokio::test]
    async fn test_count_failure_does_not_stop_notifier() {
        let db = Arc::new(FakeLockDb::default());
        db.count_returns(Err(LocketError::Unrecoverable));
        let clock = FakeClock::new(Utc::now());
        let notifier =
            MetricsNotifier::new(db.clone(), Arc::new(clock.clone()), Duration::from_secs(10));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(notifier.run(shutdown_rx));

        clock
            .wait_for_watcher_and_increment(Duration::from_secs(10))
            .await;
        eventually(|| db.count_args().len() == 1).await;
        clock.increment(Duration::from_secs(10));
        eventually(|| db.count_args().len() == 2).await;

        let _ = shutdown_tx.send(());
        handle.await.unwrap();
    }
}
