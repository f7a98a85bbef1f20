//! Server startup utilities

pub mod logging;
pub mod shutdown;

pub use logging::init_logging;
pub use shutdown::{ShutdownSignal, listen_for_signals};
