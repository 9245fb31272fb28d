//! Byzantine client simulation
//!
//! Simulates malicious federation clients. An attack has two parts:
//! which client indices are suspected (and excluded from aggregation
//! trust), and whether their reported snapshots are perturbed before
//! aggregation. Perturbation applies to `RandomNoise`/`AddNoise` only;
//! `Poison`/`IDR` corrupt training data downstream and here only select
//! a fixed, reproducible index set.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use fedkge_model::EmbeddingSnapshot;

use crate::service::SnapshotMap;

/// Uniform noise bounds for both perturbation attacks.
const NOISE_MIN: f32 = -0.1;
const NOISE_MAX: f32 = 0.1;
/// Per-element keep probability of the AddNoise mask.
const ADD_NOISE_KEEP_RATIO: f64 = 0.5;
/// Weight of the masked additive noise.
const ADD_NOISE_WEIGHT: f32 = 1.0;

/// Errors produced by Byzantine-attack simulation.
#[derive(Debug, Error)]
pub enum ByzantineError {
    /// Poison/IDR index table has no entry for this configuration.
    #[error("No poison index table for client_num={client_num}, malicious_ratio={malicious_ratio}")]
    NoPoisonTable {
        /// Configured client count
        client_num: usize,
        /// Configured malicious ratio
        malicious_ratio: f64,
    },

    /// A perturbation was requested for a mode with no injection
    /// implementation. Unknown modes are rejected at configuration time;
    /// reaching this is a bug, never a silent no-op.
    #[error("Attack mode {0} has no injection implementation")]
    Unimplemented(AttackMode),
}

/// Byzantine attack mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackMode {
    /// No attack (default)
    #[default]
    None,
    /// Replace flagged snapshots with uniform noise
    RandomNoise,
    /// Add masked uniform noise to flagged snapshots
    AddNoise,
    /// Embedding sign flip (recognized, not implemented)
    VectorFlip,
    /// Partial sign flip (recognized, not implemented)
    PartialFlip,
    /// Training-data poisoning with a fixed index set
    Poison,
    /// Inverse-distance-ratio poisoning with a fixed index set
    #[serde(rename = "IDR")]
    Idr,
}

impl AttackMode {
    /// Whether this mode mutates snapshots before aggregation.
    pub fn is_perturbation(self) -> bool {
        matches!(self, AttackMode::RandomNoise | AttackMode::AddNoise)
    }

    /// Whether this mode uses the fixed poison index table.
    pub fn uses_fixed_indices(self) -> bool {
        matches!(self, AttackMode::Poison | AttackMode::Idr)
    }

    /// Whether this mode is recognized but has no implementation yet.
    pub fn is_unimplemented(self) -> bool {
        matches!(self, AttackMode::VectorFlip | AttackMode::PartialFlip)
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackMode::None => "None",
            AttackMode::RandomNoise => "RandomNoise",
            AttackMode::AddNoise => "AddNoise",
            AttackMode::VectorFlip => "VectorFlip",
            AttackMode::PartialFlip => "PartialFlip",
            AttackMode::Poison => "Poison",
            AttackMode::Idr => "IDR",
        };
        write!(f, "{name}")
    }
}

impl FromStr for AttackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" | "none" => Ok(AttackMode::None),
            "RandomNoise" => Ok(AttackMode::RandomNoise),
            "AddNoise" => Ok(AttackMode::AddNoise),
            "VectorFlip" => Ok(AttackMode::VectorFlip),
            "PartialFlip" => Ok(AttackMode::PartialFlip),
            "Poison" => Ok(AttackMode::Poison),
            "IDR" | "Idr" => Ok(AttackMode::Idr),
            _ => Err(format!("unknown byzantine attack mode: {s}")),
        }
    }
}

/// Fixed Poison/IDR index sets, keyed by `(client_num, malicious_ratio)`.
///
/// Deterministic suspect sets, so poisoning runs are comparable across
/// repetitions; a lookup table, not a formula. Configurations outside
/// the table are rejected at validation time.
pub fn poison_indices(client_num: usize, malicious_ratio: f64) -> Option<Vec<usize>> {
    match client_num {
        5 => Some(vec![0, 3]),
        10 => {
            if (malicious_ratio - 0.4).abs() < f64::EPSILON {
                Some(vec![0, 3, 6, 9])
            } else if (malicious_ratio - 0.3).abs() < f64::EPSILON {
                Some(vec![0, 3, 6])
            } else if (malicious_ratio - 0.2).abs() < f64::EPSILON {
                Some(vec![0, 3])
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Byzantine attack plan for one run.
///
/// Indices are materialized exactly once (on the first round) and held
/// fixed for the run's duration; per-round apply flags are drawn fresh
/// every round for the stochastic perturbation modes.
#[derive(Debug, Clone)]
pub struct ByzantinePlan {
    mode: AttackMode,
    malicious_ratio: f64,
    apply_probability: f64,
    indices: Vec<usize>,
    initialized: bool,
}

impl ByzantinePlan {
    /// Creates a plan; indices are not materialized until the first round.
    pub fn new(mode: AttackMode, malicious_ratio: f64, apply_probability: f64) -> Self {
        Self {
            mode,
            malicious_ratio,
            apply_probability,
            indices: Vec::new(),
            initialized: false,
        }
    }

    /// Returns the attack mode.
    pub fn mode(&self) -> AttackMode {
        self.mode
    }

    /// Returns the suspected client indices (empty until materialized).
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Materializes the Byzantine index set on first call; later calls are
    /// no-ops, so the set is invariant across rounds.
    pub fn materialize_once<R: Rng>(
        &mut self,
        client_num: usize,
        rng: &mut R,
    ) -> Result<(), ByzantineError> {
        if self.initialized || self.mode == AttackMode::None {
            return Ok(());
        }

        self.indices = if self.mode.uses_fixed_indices() {
            poison_indices(client_num, self.malicious_ratio).ok_or(
                ByzantineError::NoPoisonTable {
                    client_num,
                    malicious_ratio: self.malicious_ratio,
                },
            )?
        } else {
            let count = (client_num as f64 * self.malicious_ratio) as usize;
            let mut sampled = rand::seq::index::sample(rng, client_num, count).into_vec();
            sampled.sort_unstable();
            sampled
        };
        self.initialized = true;
        info!(mode = %self.mode, indices = ?self.indices, "materialized byzantine index set");
        Ok(())
    }

    /// Draws this round's per-client apply flags (stochastic modes only).
    pub fn draw_apply_flags<R: Rng>(&self, rng: &mut R) -> Vec<bool> {
        if self.mode.uses_fixed_indices() || self.mode == AttackMode::None {
            return Vec::new();
        }
        (0..self.indices.len())
            .map(|_| rng.gen::<f64>() < self.apply_probability)
            .collect()
    }

    /// Applies the configured perturbation to the round's snapshot map.
    ///
    /// `Poison`/`IDR`/`None` leave snapshots untouched (those modes only
    /// affect aggregation trust). Unimplemented modes are an error.
    pub fn inject<R: Rng>(
        &self,
        snapshots: &mut SnapshotMap,
        apply_flags: &[bool],
        rng: &mut R,
    ) -> Result<(), ByzantineError> {
        match self.mode {
            AttackMode::None | AttackMode::Poison | AttackMode::Idr => Ok(()),
            AttackMode::RandomNoise => {
                for (slot, &client) in self.indices.iter().enumerate() {
                    if !apply_flags.get(slot).copied().unwrap_or(false) {
                        continue;
                    }
                    if let Some(snapshot) = snapshots.get_mut(&client) {
                        debug!(client, "replacing snapshot with random noise");
                        *snapshot =
                            EmbeddingSnapshot::uniform(snapshot.shape(), NOISE_MAX, rng);
                    }
                }
                Ok(())
            }
            AttackMode::AddNoise => {
                for (slot, &client) in self.indices.iter().enumerate() {
                    if !apply_flags.get(slot).copied().unwrap_or(false) {
                        continue;
                    }
                    if let Some(snapshot) = snapshots.get_mut(&client) {
                        debug!(client, "adding masked noise to snapshot");
                        for value in snapshot.data_mut().iter_mut() {
                            if rng.gen::<f64>() < ADD_NOISE_KEEP_RATIO {
                                *value +=
                                    ADD_NOISE_WEIGHT * rng.gen_range(NOISE_MIN..=NOISE_MAX);
                            }
                        }
                    }
                }
                Ok(())
            }
            mode => Err(ByzantineError::Unimplemented(mode)),
        }
    }
}
