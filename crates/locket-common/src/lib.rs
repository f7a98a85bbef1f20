//! Locket Common - Shared types and capabilities
//!
//! This crate provides the foundational types used across all Locket components:
//! - Lock data model (`Resource`, `TypeCode`, `Lock`)
//! - Error taxonomy
//! - GUID provider
//! - Clock capability with a fake for tests

pub mod clock;
pub mod error;
pub mod guid;
pub mod model;

// Re-exports for convenience
pub use clock::{Clock, FakeClock, SystemClock, Ticker, Timer};
pub use error::{LocketError, Result};
pub use guid::{GuidProvider, UuidGuidProvider};
pub use model::{LOCK_TYPE, Lock, PRESENCE_TYPE, Resource, TypeCode};
