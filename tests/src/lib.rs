//! Integration test framework for fedkge
//!
//! Mock components and utilities for end-to-end tests of the federation
//! round protocol.
//!
//! # Components
//!
//! - [`mock_server`] - Aggregation service that records every call for
//!   protocol-level assertions
//! - [`scripted_client`] - Client proxy that replays a fixed metric
//!   schedule, for driving the convergence tracker into chosen branches
//! - [`test_utils`] - Logging setup and shared fixtures

pub mod mock_server;
pub mod scripted_client;
pub mod test_utils;

#[cfg(test)]
mod e2e_scenario;

pub use mock_server::{AggregateCall, RecordingAggregator};
pub use scripted_client::ScriptedClient;
pub use test_utils::{init_test_logging, small_run_config};
