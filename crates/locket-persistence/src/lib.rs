//! Locket Persistence - the SQL lock store
//!
//! This crate provides:
//! - The SeaORM entity for the `locks` table
//! - The `LockDb` trait the rest of Locket programs against
//! - `SqlLockDb`, the MySQL/PostgreSQL implementation

pub mod entity;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use entity::prelude::*;
pub use sql::SqlLockDb;
pub use traits::LockDb;
