//! Locket server library
//!
//! Configuration loading, logging and shutdown handling, and the wiring that
//! turns a database connection into a running lock service.

pub mod config; // Configuration management
pub mod server; // Component wiring
pub mod startup; // Logging and shutdown utilities

pub use server::{LocketServer, Settings};
