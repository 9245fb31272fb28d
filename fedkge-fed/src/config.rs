//! Run configuration
//!
//! All mode names (federation mode, attack mode, anomaly policy,
//! orchestration strategy) resolve to closed enums here, and every
//! validation rule fires before any training round executes. After
//! [`RunConfig::validate`] succeeds the configuration is treated as
//! immutable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use fedkge_aggregate::{byzantine, AnomalyPolicy, AttackMode};
use fedkge_model::EmbeddingShape;

/// Errors raised by configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The required local data directory was not set.
    #[error("local_file_dir must be set")]
    MissingLocalFileDir,

    /// Client count must be positive.
    #[error("client_num must be at least 1")]
    NoClients,

    /// An iteration parameter that drives a loop or cadence was zero.
    #[error("{name} must be at least 1")]
    ZeroIteration {
        /// Offending parameter name
        name: &'static str,
    },

    /// Malicious ratio outside [0, 1].
    #[error("malicious_ratio must be within [0, 1], got {0}")]
    InvalidMaliciousRatio(f64),

    /// Per-round apply probability outside [0, 1].
    #[error("apply_probability must be within [0, 1], got {0}")]
    InvalidApplyProbability(f64),

    /// A recognized but unimplemented attack mode was selected.
    #[error("byzantine attack mode {0} is not implemented")]
    UnimplementedAttack(AttackMode),

    /// Poison/IDR selected for a configuration outside the index table.
    #[error("no poison index table for client_num={client_num}, malicious_ratio={malicious_ratio}")]
    NoPoisonTable {
        /// Configured client count
        client_num: usize,
        /// Configured malicious ratio
        malicious_ratio: f64,
    },
}

/// Federation mode. The distillation weight `eta` is derived from the
/// mode, never independently settable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FedMode {
    /// Federated averaging
    #[default]
    FedAvg,
    /// Federated averaging with a proximal term
    FedProx,
    /// Distillation-only federation (no embedding overwrite)
    FedDist,
}

impl FedMode {
    /// Derived distillation weight: 0 for FedDist, 1 otherwise.
    pub fn eta(self) -> f32 {
        match self {
            FedMode::FedDist => 0.0,
            FedMode::FedAvg | FedMode::FedProx => 1.0,
        }
    }
}

impl fmt::Display for FedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FedMode::FedAvg => write!(f, "FedAvg"),
            FedMode::FedProx => write!(f, "FedProx"),
            FedMode::FedDist => write!(f, "FedDist"),
        }
    }
}

impl FromStr for FedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FedAvg" => Ok(FedMode::FedAvg),
            "FedProx" => Ok(FedMode::FedProx),
            "FedDist" => Ok(FedMode::FedDist),
            _ => Err(format!("unknown fed mode: {s}")),
        }
    }
}

/// Orchestration strategy: which driving loop runs the federation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Gated-distillation pipeline with convergence tracking, early stop,
    /// and Byzantine robustness, driven by `max_iter`.
    #[default]
    GatedRobust,
    /// Plain periodic averaging without gating or robustness, driven by
    /// `aggregate_iteration`.
    PlainAveraging,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::GatedRobust => write!(f, "GatedRobust"),
            Strategy::PlainAveraging => write!(f, "PlainAveraging"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GatedRobust" | "gated" => Ok(Strategy::GatedRobust),
            "PlainAveraging" | "plain" => Ok(Strategy::PlainAveraging),
            _ => Err(format!("unknown orchestration strategy: {s}")),
        }
    }
}

/// Run parameters for one federation run. Immutable after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of federation clients
    pub client_num: usize,
    /// Local data directory (required; glue for the client data loaders)
    pub local_file_dir: Option<PathBuf>,
    /// Checkpoint output directory (glue)
    pub save_dir: Option<PathBuf>,
    /// Entity vocabulary size of the simulated model
    pub entity_count: usize,
    /// Base embedding dimension
    pub hidden_dim: usize,
    /// Double the entity dimension (two real components per complex entry)
    pub double_entity_embedding: bool,
    /// Round budget for the plain-averaging strategy
    pub aggregate_iteration: usize,
    /// Round budget for the gated/robust strategy
    pub max_iter: usize,
    /// Validation cadence in rounds
    pub valid_iter: usize,
    /// Early-stop patience, in non-improving checkpoints
    pub early_stop_iter: usize,
    /// Warm-up length before distillation gating may relax
    pub wait_iter: usize,
    /// Federation mode (derives eta)
    pub fed_mode: FedMode,
    /// Orchestration strategy
    pub strategy: Strategy,
    /// Byzantine attack mode
    pub byzantine: AttackMode,
    /// Fraction of clients acting maliciously
    pub malicious_ratio: f64,
    /// Per-round probability that a flagged client applies its attack
    pub apply_probability: f64,
    /// Anomaly-detection policy passed through to aggregation
    pub adm: AnomalyPolicy,
    /// RNG seed; a random seed is drawn when absent
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            client_num: 10,
            local_file_dir: None,
            save_dir: None,
            entity_count: 1000,
            hidden_dim: 256,
            double_entity_embedding: false,
            aggregate_iteration: 200,
            max_iter: 300,
            valid_iter: 5,
            early_stop_iter: 15,
            wait_iter: 10,
            fed_mode: FedMode::default(),
            strategy: Strategy::default(),
            byzantine: AttackMode::default(),
            malicious_ratio: 0.4,
            apply_probability: 1.0,
            adm: AnomalyPolicy::default(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Derived distillation weight; see [`FedMode::eta`].
    pub fn eta(&self) -> f32 {
        self.fed_mode.eta()
    }

    /// Shape of every entity-embedding snapshot in this run.
    pub fn embedding_shape(&self) -> EmbeddingShape {
        let dim = if self.double_entity_embedding {
            self.hidden_dim * 2
        } else {
            self.hidden_dim
        };
        EmbeddingShape::new(self.entity_count, dim)
    }

    /// Validates every rule that can be checked before training starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_file_dir.is_none() {
            return Err(ConfigError::MissingLocalFileDir);
        }
        if self.client_num == 0 {
            return Err(ConfigError::NoClients);
        }
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroIteration { name: "max_iter" });
        }
        if self.valid_iter == 0 {
            return Err(ConfigError::ZeroIteration { name: "valid_iter" });
        }
        if self.early_stop_iter == 0 {
            return Err(ConfigError::ZeroIteration {
                name: "early_stop_iter",
            });
        }
        if self.strategy == Strategy::PlainAveraging && self.aggregate_iteration == 0 {
            return Err(ConfigError::ZeroIteration {
                name: "aggregate_iteration",
            });
        }
        if !(0.0..=1.0).contains(&self.malicious_ratio) {
            return Err(ConfigError::InvalidMaliciousRatio(self.malicious_ratio));
        }
        if !(0.0..=1.0).contains(&self.apply_probability) {
            return Err(ConfigError::InvalidApplyProbability(self.apply_probability));
        }
        if self.byzantine.is_unimplemented() {
            return Err(ConfigError::UnimplementedAttack(self.byzantine));
        }
        if self.byzantine.uses_fixed_indices()
            && byzantine::poison_indices(self.client_num, self.malicious_ratio).is_none()
        {
            return Err(ConfigError::NoPoisonTable {
                client_num: self.client_num,
                malicious_ratio: self.malicious_ratio,
            });
        }
        Ok(())
    }
}

/// Loads and validates a run configuration from a YAML file.
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: RunConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
