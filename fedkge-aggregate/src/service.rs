//! Aggregation service contract

use std::collections::BTreeMap;
use thiserror::Error;

use fedkge_model::{EmbeddingShape, EmbeddingSnapshot};

/// Round snapshot collection, keyed by client index.
///
/// A `BTreeMap` keeps iteration in client-index order, which keeps logging
/// and aggregation deterministic across runs.
pub type SnapshotMap = BTreeMap<usize, EmbeddingSnapshot>;

/// Errors produced by aggregation-side operations.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Aggregation was requested before the global embedding existed.
    #[error("Global embedding has not been generated")]
    NotInitialized,

    /// The snapshot map was empty.
    #[error("No client snapshots to aggregate")]
    EmptySnapshotMap,

    /// A snapshot did not match the model shape.
    #[error("Snapshot from client {client} has shape {actual}, expected {expected}")]
    ShapeMismatch {
        /// Offending client index
        client: usize,
        /// Expected shape
        expected: EmbeddingShape,
        /// Actual shape
        actual: EmbeddingShape,
    },

    /// Every contribution was excluded (Byzantine trust plus anomaly filter).
    #[error("All {total} contributions were excluded from aggregation")]
    AllContributionsExcluded {
        /// Total contributions in the round
        total: usize,
    },

    /// Sample weights were not configured for every client.
    #[error("Have {weights} client weights for {clients} clients")]
    WeightCountMismatch {
        /// Configured weight count
        weights: usize,
        /// Client count in the snapshot map
        clients: usize,
    },

    /// A snapshot key does not correspond to any configured client.
    #[error("Snapshot from unknown client {client}; roster has {clients} clients")]
    UnknownClient {
        /// Offending client index
        client: usize,
        /// Configured client count
        clients: usize,
    },
}

/// Contract between the round orchestrator and the aggregation server.
///
/// Internals (exact weighting formula, anomaly-detection model) are the
/// implementation's business; the orchestrator depends only on these three
/// operations.
pub trait AggregationService {
    /// Generates the initial global embedding for the run.
    fn generate_global_embedding(&mut self) -> Result<(), AggregateError>;

    /// Assigns the current global embedding out, one snapshot per client.
    fn assign_embedding(&self) -> Result<SnapshotMap, AggregateError>;

    /// Aggregates client snapshots into a new global embedding.
    ///
    /// `byzantine_indices` are the clients currently suspected malicious;
    /// their contributions are excluded from trust.
    fn aggregate_embedding(
        &mut self,
        snapshots: &SnapshotMap,
        byzantine_indices: &[usize],
    ) -> Result<(), AggregateError>;
}
