//! Recording aggregation service
//!
//! Wraps a plain unweighted mean in the [`AggregationService`] contract
//! and records every aggregate call, so tests can assert how many
//! aggregation rounds ran and which clients were distrusted in each.

use ndarray::Array2;
use tracing::debug;

use fedkge_aggregate::{AggregateError, AggregationService, SnapshotMap};
use fedkge_model::{EmbeddingShape, EmbeddingSnapshot};

/// One recorded `aggregate_embedding` invocation.
#[derive(Debug, Clone)]
pub struct AggregateCall {
    /// Byzantine indices passed in
    pub byzantine_indices: Vec<usize>,
    /// The snapshots the server saw, as submitted
    pub snapshots: SnapshotMap,
}

/// Unweighted-mean aggregation server that records its inputs.
#[derive(Debug)]
pub struct RecordingAggregator {
    shape: EmbeddingShape,
    client_num: usize,
    global: Option<EmbeddingSnapshot>,
    /// Every aggregate call, in order.
    pub calls: Vec<AggregateCall>,
    /// Number of `generate_global_embedding` calls.
    pub generate_calls: usize,
    /// Number of `assign_embedding` calls.
    pub assign_calls: std::cell::Cell<usize>,
}

impl RecordingAggregator {
    /// Creates a recording aggregator for `client_num` clients.
    pub fn new(shape: EmbeddingShape, client_num: usize) -> Self {
        Self {
            shape,
            client_num,
            global: None,
            calls: Vec::new(),
            generate_calls: 0,
            assign_calls: std::cell::Cell::new(0),
        }
    }

    /// Current global embedding, if generated.
    pub fn global(&self) -> Option<&EmbeddingSnapshot> {
        self.global.as_ref()
    }
}

impl AggregationService for RecordingAggregator {
    fn generate_global_embedding(&mut self) -> Result<(), AggregateError> {
        self.generate_calls += 1;
        self.global = Some(EmbeddingSnapshot::zeros(self.shape));
        Ok(())
    }

    fn assign_embedding(&self) -> Result<SnapshotMap, AggregateError> {
        self.assign_calls.set(self.assign_calls.get() + 1);
        let global = self.global.as_ref().ok_or(AggregateError::NotInitialized)?;
        Ok((0..self.client_num).map(|i| (i, global.clone())).collect())
    }

    fn aggregate_embedding(
        &mut self,
        snapshots: &SnapshotMap,
        byzantine_indices: &[usize],
    ) -> Result<(), AggregateError> {
        if snapshots.is_empty() {
            return Err(AggregateError::EmptySnapshotMap);
        }
        self.calls.push(AggregateCall {
            byzantine_indices: byzantine_indices.to_vec(),
            snapshots: snapshots.clone(),
        });

        let trusted: Vec<&EmbeddingSnapshot> = snapshots
            .iter()
            .filter(|&(client, _)| !byzantine_indices.contains(client))
            .map(|(_, snapshot)| snapshot)
            .collect();
        if trusted.is_empty() {
            return Err(AggregateError::AllContributionsExcluded {
                total: snapshots.len(),
            });
        }

        let mut sum: Array2<f32> = Array2::zeros((self.shape.entities, self.shape.dim));
        for snapshot in &trusted {
            sum = sum + snapshot.data();
        }
        let mean = sum / trusted.len() as f32;
        debug!(trusted = trusted.len(), "mock aggregation round");
        self.global = Some(EmbeddingSnapshot::new(mean));
        Ok(())
    }
}
