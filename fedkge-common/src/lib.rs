//! Common infrastructure for fedkge
//!
//! Logging setup shared by the simulation binary and the integration
//! tests. Library crates emit through `tracing` directly; only binaries
//! and test harnesses install a subscriber.

pub mod logging;

pub use logging::{init_logging, init_logging_with_filter, LogLevel};
