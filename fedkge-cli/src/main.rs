//! fedkge simulation binary
//!
//! Runs a full federated knowledge-graph-embedding training simulation:
//! configuration loading and validation, federation setup, the round
//! protocol, and the final weighted test report.
//!
//! # Usage
//!
//! ```bash
//! fedkge -c config/run.yaml
//! fedkge --client-num 10 --local-file-dir data/fb15k-237 --byzantine RandomNoise --adm IF
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fedkge_aggregate::{AnomalyPolicy, AttackMode, WeightedAggregator};
use fedkge_common::logging::{init_logging, init_logging_with_filter, LogLevel};
use fedkge_fed::{load_run_config, FedMode, Orchestrator, RunConfig, Strategy};
use fedkge_model::SimulatedClient;

/// fedkge - federated KGE training simulator
#[derive(Parser, Debug)]
#[command(name = "fedkge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the run configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Number of federation clients
    #[arg(long, value_name = "N")]
    client_num: Option<usize>,

    /// Local data directory
    #[arg(long, value_name = "DIR")]
    local_file_dir: Option<PathBuf>,

    /// Checkpoint output directory
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Round budget for the gated strategy
    #[arg(long, value_name = "N")]
    max_iter: Option<usize>,

    /// Round budget for the plain-averaging strategy
    #[arg(long, value_name = "N")]
    aggregate_iteration: Option<usize>,

    /// Validation cadence in rounds
    #[arg(long, value_name = "N")]
    valid_iter: Option<usize>,

    /// Early-stop patience in non-improving validation rounds
    #[arg(long, value_name = "N")]
    early_stop_iter: Option<usize>,

    /// Warm-up rounds before distillation gating may relax
    #[arg(long, value_name = "N")]
    wait_iter: Option<usize>,

    /// Federation mode: FedAvg, FedProx, or FedDist
    #[arg(long, value_name = "MODE")]
    fed_mode: Option<FedMode>,

    /// Orchestration strategy: GatedRobust or PlainAveraging
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<Strategy>,

    /// Byzantine attack mode, e.g. None, RandomNoise, AddNoise, Poison, IDR
    #[arg(long, value_name = "MODE")]
    byzantine: Option<AttackMode>,

    /// Fraction of clients acting maliciously
    #[arg(long, value_name = "RATIO")]
    malicious_ratio: Option<f64>,

    /// Per-round probability that a flagged client applies its attack
    #[arg(long, value_name = "PROB")]
    apply_probability: Option<f64>,

    /// Anomaly-detection policy: None, IsolationForest (IF), or ECOD
    #[arg(long, value_name = "POLICY")]
    adm: Option<AnomalyPolicy>,

    /// RNG seed for a reproducible run
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Per-module filter directive, e.g. "info,fedkge_fed=debug";
    /// takes precedence over --log-level
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,
}

impl Args {
    /// Loads the config file (or defaults) and applies CLI overrides.
    fn resolve_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config_file {
            Some(path) => load_run_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(n) = self.client_num {
            config.client_num = n;
        }
        if let Some(dir) = &self.local_file_dir {
            config.local_file_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.save_dir {
            config.save_dir = Some(dir.clone());
        }
        if let Some(n) = self.max_iter {
            config.max_iter = n;
        }
        if let Some(n) = self.aggregate_iteration {
            config.aggregate_iteration = n;
        }
        if let Some(n) = self.valid_iter {
            config.valid_iter = n;
        }
        if let Some(n) = self.early_stop_iter {
            config.early_stop_iter = n;
        }
        if let Some(n) = self.wait_iter {
            config.wait_iter = n;
        }
        if let Some(mode) = self.fed_mode {
            config.fed_mode = mode;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(mode) = self.byzantine {
            config.byzantine = mode;
        }
        if let Some(ratio) = self.malicious_ratio {
            config.malicious_ratio = ratio;
        }
        if let Some(prob) = self.apply_probability {
            config.apply_probability = prob;
        }
        if let Some(policy) = self.adm {
            config.adm = policy;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match &args.log_filter {
        Some(filter) => init_logging_with_filter(filter),
        None => init_logging(args.log_level),
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.resolve_config()?;
    config.validate().context("Invalid run configuration")?;

    info!(
        clients = config.client_num,
        fed_mode = %config.fed_mode,
        strategy = %config.strategy,
        byzantine = %config.byzantine,
        adm = %config.adm,
        "starting federation run"
    );

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let weights: Vec<u64> = (0..config.client_num as u64).map(|i| 100 + 20 * i).collect();
    let server = WeightedAggregator::new(
        config.embedding_shape(),
        weights,
        config.adm,
        config.seed.unwrap_or(0),
    );

    let mut orchestrator =
        Orchestrator::new(config, server, clients).context("Failed to set up federation")?;
    orchestrator
        .initialize()
        .context("Failed to initialize federation models")?;
    let report = orchestrator.run().context("Federation run failed")?;

    info!(
        best_iter = report.best_iter,
        rounds_run = report.rounds_run,
        stopped_early = report.stopped_early,
        byzantine = ?report.byzantine_indices,
        "federation run complete"
    );
    println!("Best iteration: {}", report.best_iter);
    println!("Rounds run: {}", report.rounds_run);
    if !report.byzantine_indices.is_empty() {
        println!("Byzantine clients: {:?}", report.byzantine_indices);
    }
    println!("Final weighted test metrics:");
    for (metric, value) in &report.test_metrics {
        println!("  {metric}: {value:.6}");
    }
    Ok(())
}
