//! Lock TTL supervisor
//!
//! `LockPick` keeps at most one watcher task per key. A watcher waits out the
//! lock's TTL on the injected clock, then re-reads the row and releases it only
//! if nobody wrote to it since the watcher was registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use locket_common::{Clock, Lock, LocketError, Timer, TypeCode};
use locket_persistence::LockDb;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

use crate::metrics;

/// The current watcher of one key
struct Watcher {
    modified_index: i64,
    generation: u64,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

type WatcherMap = Arc<Mutex<HashMap<String, Watcher>>>;

/// Expiration supervisor for locks and presences
pub struct LockPick {
    db: Arc<dyn LockDb>,
    clock: Arc<dyn Clock>,
    watchers: WatcherMap,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl LockPick {
    pub fn new(db: Arc<dyn LockDb>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            watchers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Make sure a watcher covers this generation of `lock`
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_ttl(&self, lock: &Lock) {
        let lock_type = lock.resource.resolved_type();
        let span = info_span!(
            "register-ttl",
            key = %lock.resource.key,
            modified_index = lock.modified_index,
            "type" = %lock_type
        );
        let _entered = span.enter();

        let key = lock.resource.key.clone();
        let mut watchers = self.watchers.lock();

        if self.closed.load(Ordering::Acquire) {
            debug!("lock-pick-closed");
            return;
        }

        if let Some(existing) = watchers.get(&key) {
            if lock.modified_index <= existing.modified_index {
                debug!(
                    watching_index = existing.modified_index,
                    "found-expiration-goroutine"
                );
                return;
            }
            info!(
                old_index = existing.modified_index,
                "cancelling-old-check"
            );
            if let Some(old) = watchers.remove(&key) {
                let _ = old.cancel.send(());
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let ttl = Duration::from_secs(lock.ttl_in_seconds.max(0) as u64);
        let timer = self.clock.new_timer(ttl);
        let (cancel, cancelled) = oneshot::channel();

        let handle = tokio::spawn(
            watch(
                self.db.clone(),
                self.watchers.clone(),
                lock.clone(),
                generation,
                timer,
                cancelled,
            )
            .instrument(span.clone()),
        );

        watchers.insert(
            key,
            Watcher {
                modified_index: lock.modified_index,
                generation,
                cancel,
                handle,
            },
        );
        debug!("registered-expiration-check");
    }

    /// Number of keys currently watched
    pub fn watched_keys(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Cancel every watcher and wait for in-flight checks to finish
    pub async fn shutdown(&self) {
        let drained: Vec<Watcher> = {
            let mut watchers = self.watchers.lock();
            self.closed.store(true, Ordering::Release);
            watchers.drain().map(|(_, watcher)| watcher).collect()
        };

        info!(count = drained.len(), "lock-pick-shutting-down");
        for watcher in drained {
            let _ = watcher.cancel.send(());
            let _ = watcher.handle.await;
        }
    }
}

/// Body of one watcher task
async fn watch(
    db: Arc<dyn LockDb>,
    watchers: WatcherMap,
    lock: Lock,
    generation: u64,
    mut timer: Box<dyn Timer>,
    mut cancelled: oneshot::Receiver<()>,
) {
    tokio::select! {
        _ = timer.fired() => {}
        _ = &mut cancelled => {
            debug!("expiration-check-cancelled");
            return;
        }
    }
    drop(timer);

    check_expiration(db.as_ref(), &lock).await;

    let mut watchers = watchers.lock();
    if watchers
        .get(lock.key())
        .is_some_and(|w| w.generation == generation)
    {
        watchers.remove(lock.key());
    }
}

/// Release `lock` if the row still holds the generation it was registered with
async fn check_expiration(db: &dyn LockDb, lock: &Lock) {
    let current = match db.fetch(lock.key()).await {
        Ok(current) => current,
        Err(LocketError::ResourceNotFound) => {
            debug!("lock-already-released");
            return;
        }
        Err(err) => {
            error!(error = %err, "failed-to-fetch-lock");
            return;
        }
    };

    if !current.same_generation(lock) {
        debug!(
            current_index = current.modified_index,
            "lock-was-renewed"
        );
        return;
    }

    if let Err(err) = db.release(&lock.resource).await {
        error!(error = %err, "failed-to-release-lock");
        return;
    }

    match lock.resource.resolved_type_code() {
        TypeCode::Presence => metrics::record_presence_expired(),
        _ => metrics::record_lock_expired(),
    }
    info!("lock-expired");
}
