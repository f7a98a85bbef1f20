// Locket request handling
// Validates requests, drives the lock store and hands fresh locks to the lock pick

use std::sync::Arc;

use locket_common::{LOCK_TYPE, LocketError, PRESENCE_TYPE, Resource, Result, TypeCode};
use locket_persistence::LockDb;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info_span};

use crate::expiration::LockPick;

/// Check that a type string and type code agree
///
/// An `Unknown` code needs a known type string. A known code accepts an empty
/// string or its own name.
pub fn validate_type(r#type: &str, type_code: TypeCode) -> Result<()> {
    match type_code {
        TypeCode::Unknown => {
            if r#type == LOCK_TYPE || r#type == PRESENCE_TYPE {
                Ok(())
            } else {
                Err(LocketError::InvalidType)
            }
        }
        code => {
            if r#type.is_empty() || code.type_name() == Some(r#type) {
                Ok(())
            } else {
                Err(LocketError::InvalidType)
            }
        }
    }
}

pub struct LocketService {
    db: Arc<dyn LockDb>,
    lock_pick: Arc<LockPick>,
    exit_tx: mpsc::Sender<()>,
}

impl LocketService {
    pub fn new(db: Arc<dyn LockDb>, lock_pick: Arc<LockPick>, exit_tx: mpsc::Sender<()>) -> Self {
        Self {
            db,
            lock_pick,
            exit_tx,
        }
    }

    /// Acquire or renew `resource` and schedule its expiry
    pub async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<()> {
        let span = info_span!("lock", key = %resource.key, owner = %resource.owner);
        async {
            debug!("started");

            if let Err(err) = validate_type(&resource.r#type, resource.type_code) {
                error!(
                    error = %err,
                    "type" = %resource.r#type,
                    type_code = %resource.type_code,
                    "invalid-request"
                );
                return Err(err);
            }

            if ttl_in_seconds <= 0 {
                error!(error = %LocketError::InvalidTtl, "failed-locking-lock");
                return Err(LocketError::InvalidTtl);
            }

            if resource.owner.is_empty() {
                error!(error = %LocketError::InvalidOwner, "failed-locking-lock");
                return Err(LocketError::InvalidOwner);
            }

            let lock = match self.db.lock(resource, ttl_in_seconds).await {
                Ok(lock) => lock,
                Err(err) => {
                    self.exit_if_unrecoverable(&err);
                    if err != LocketError::LockCollision {
                        error!(error = %err, "failed-locking-lock");
                    }
                    return Err(err);
                }
            };

            self.lock_pick.register_ttl(&lock);
            debug!("complete");
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn release(&self, resource: &Resource) -> Result<()> {
        let span = info_span!("release", key = %resource.key, owner = %resource.owner);
        async {
            self.db.release(resource).await.inspect_err(|err| {
                self.exit_if_unrecoverable(err);
            })
        }
        .instrument(span)
        .await
    }

    pub async fn fetch(&self, key: &str) -> Result<Resource> {
        let span = info_span!("fetch", key = %key);
        async {
            let lock = self.db.fetch(key).await.inspect_err(|err| {
                self.exit_if_unrecoverable(err);
            })?;
            Ok(lock.resource)
        }
        .instrument(span)
        .await
    }

    /// Held resources of one type, resolved from the string/code pair
    pub async fn fetch_all(&self, r#type: &str, type_code: TypeCode) -> Result<Vec<Resource>> {
        let span = info_span!("fetch-all", "type" = %r#type, type_code = %type_code);
        async {
            if let Err(err) = validate_type(r#type, type_code) {
                error!(error = %err, "invalid-request");
                return Err(err);
            }

            let filter = Resource {
                r#type: r#type.to_string(),
                type_code,
                ..Default::default()
            }
            .resolved_type();

            let locks = self.db.fetch_all(&filter).await.inspect_err(|err| {
                self.exit_if_unrecoverable(err);
            })?;
            Ok(locks.into_iter().map(|lock| lock.resource).collect())
        }
        .instrument(span)
        .await
    }

    fn exit_if_unrecoverable(&self, err: &LocketError) {
        if !err.is_unrecoverable() {
            return;
        }

        error!(error = %err, "unrecoverable-error");
        // A full channel means shutdown is already pending
        let _ = self.exit_tx.try_send(());
    }
}
