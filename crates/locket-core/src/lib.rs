//! Locket Core - expiration supervision and request handling
//!
//! This crate provides:
//! - `LockPick`, the per-key TTL watcher supervisor
//! - `Burglar`, the sweep that re-registers every held row
//! - Expiration counters and the active lock gauges
//! - `LocketService`, the transport-independent request handler

pub mod expiration;
pub mod metrics;
pub mod service;

#[cfg(test)]
mod testing;

pub use expiration::{Burglar, LockPick};
pub use self::metrics::{MetricsNotifier, init_metrics};
pub use service::LocketService;
