//! Shared test setup

use fedkge_fed::RunConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes logging for tests.
///
/// Uses the RUST_LOG environment variable if set, otherwise defaults to
/// "info". Safe to call from every test; later calls are no-ops.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Small deterministic run configuration used across the e2e scenarios.
pub fn small_run_config() -> RunConfig {
    RunConfig {
        client_num: 5,
        local_file_dir: Some(PathBuf::from("data")),
        entity_count: 16,
        hidden_dim: 4,
        max_iter: 3,
        valid_iter: 1,
        early_stop_iter: 15,
        wait_iter: 10,
        seed: Some(1),
        ..RunConfig::default()
    }
}
