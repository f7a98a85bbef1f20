//! Lock store trait
//!
//! Defines the interface the expiration supervisor and the request service
//! use to reach the lock table.

use async_trait::async_trait;
use locket_common::{Lock, Resource, Result};

/// Lock store operations
#[async_trait]
pub trait LockDb: Send + Sync {
    /// Acquire or renew `resource` for its owner
    ///
    /// Fails with `LockCollision` when another owner holds the key.
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock>;

    /// Delete the row for `resource` if its owner holds it
    ///
    /// Fails with `ResourceNotFound` when the key is free or held by someone else.
    async fn release(&self, resource: &Resource) -> Result<()>;

    /// Current holder of `key`
    async fn fetch(&self, key: &str) -> Result<Lock>;

    /// All held rows, optionally restricted to one type (`""` means any type)
    async fn fetch_all(&self, lock_type: &str) -> Result<Vec<Lock>>;

    /// Number of held rows, with the same filter as `fetch_all`
    async fn count(&self, lock_type: &str) -> Result<usize>;
}
