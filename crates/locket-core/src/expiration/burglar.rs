//! Periodic reconciliation between the store and the lock pick
//!
//! Every held row gets re-registered so that locks written before a restart,
//! or whose watcher was lost, still expire.

use std::sync::Arc;
use std::time::Duration;

use locket_common::Clock;
use locket_persistence::LockDb;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::LockPick;

pub struct Burglar {
    db: Arc<dyn LockDb>,
    lock_pick: Arc<LockPick>,
    clock: Arc<dyn Clock>,
    retry_interval: Duration,
}

impl Burglar {
    pub fn new(
        db: Arc<dyn LockDb>,
        lock_pick: Arc<LockPick>,
        clock: Arc<dyn Clock>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            db,
            lock_pick,
            clock,
            retry_interval,
        }
    }

    /// Sweep once right away, then on every tick until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            retry_interval_secs = self.retry_interval.as_secs(),
            "burglar-started"
        );
        self.sweep().await;

        let mut ticker = self.clock.new_ticker(self.retry_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => break,
            }
        }
        info!("burglar-stopped");
    }

    async fn sweep(&self) {
        let locks = match self.db.fetch_all("").await {
            Ok(locks) => locks,
            Err(err) => {
                error!(error = %err, "failed-to-fetch-locks");
                return;
            }
        };

        debug!(count = locks.len(), "registering-held-locks");
        for lock in &locks {
            self.lock_pick.register_ttl(lock);
        }
    }
}
