//! Component wiring for a running Locket instance

use std::sync::Arc;
use std::time::Duration;

use locket_common::{Clock, LocketError, Result, UuidGuidProvider};
use locket_core::{Burglar, LockPick, LocketService, MetricsNotifier};
use locket_persistence::{LockDb, SqlLockDb};
use sea_orm::DatabaseConnection;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::startup::ShutdownSignal;

/// Intervals of the background loops
#[derive(Clone, Debug)]
pub struct Settings {
    pub retry_interval: Duration,
    pub metrics_interval: Duration,
}

pub struct LocketServer {
    service: Arc<LocketService>,
    lock_pick: Arc<LockPick>,
    tasks: Vec<JoinHandle<()>>,
    exit_rx: mpsc::Receiver<()>,
    shutdown: ShutdownSignal,
    shutdown_rx: broadcast::Receiver<()>,
}

impl LocketServer {
    /// Create the lock table if needed and start the background loops
    pub async fn start(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        settings: Settings,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        let store = SqlLockDb::new(db, Arc::new(UuidGuidProvider));
        store.create_lock_table().await?;
        let store: Arc<dyn LockDb> = Arc::new(store);

        let lock_pick = Arc::new(LockPick::new(store.clone(), clock.clone()));
        let (exit_tx, exit_rx) = mpsc::channel(1);
        let service = Arc::new(LocketService::new(
            store.clone(),
            lock_pick.clone(),
            exit_tx,
        ));

        let burglar = Burglar::new(
            store.clone(),
            lock_pick.clone(),
            clock.clone(),
            settings.retry_interval,
        );
        let notifier = MetricsNotifier::new(store, clock, settings.metrics_interval);
        let tasks = vec![
            tokio::spawn(burglar.run(shutdown.subscribe())),
            tokio::spawn(notifier.run(shutdown.subscribe())),
        ];
        let shutdown_rx = shutdown.subscribe();

        info!("locket-started");

        Ok(Self {
            service,
            lock_pick,
            tasks,
            exit_rx,
            shutdown,
            shutdown_rx,
        })
    }

    pub fn service(&self) -> Arc<LocketService> {
        self.service.clone()
    }

    /// Run until shutdown is requested or the store becomes unusable
    ///
    /// Returns `Unrecoverable` when stopped by a store failure.
    pub async fn run(mut self) -> Result<()> {
        let outcome = tokio::select! {
            _ = self.shutdown_rx.recv() => Ok(()),
            _ = self.exit_rx.recv() => {
                error!("exiting-on-unrecoverable-error");
                self.shutdown.shutdown();
                Err(LocketError::Unrecoverable)
            }
        };

        for task in self.tasks {
            let _ = task.await;
        }
        self.lock_pick.shutdown().await;

        info!("locket-stopped");
        outcome
    }
}
