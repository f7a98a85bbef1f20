//! TTL expiration: per-key watchers plus the periodic reconciliation sweep

mod burglar;
mod lock_pick;

pub use burglar::Burglar;
pub use lock_pick::LockPick;
