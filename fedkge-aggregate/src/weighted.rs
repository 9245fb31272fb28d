//! Sample-count-weighted reference aggregator
//!
//! Computes the new global embedding as the weighted mean of trusted client
//! snapshots, where each client's weight is its training-sample count.
//! Clients in the Byzantine index set are always excluded from trust; when
//! an anomaly-detection policy is configured, contributions whose embedding
//! norm is a statistical outlier among the trusted set are dropped as well.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use fedkge_model::{EmbeddingShape, EmbeddingSnapshot};

use crate::anomaly::{AnomalyPolicy, NormOutlierFilter};
use crate::service::{AggregateError, AggregationService, SnapshotMap};

/// Default uniform init scale for the initial global embedding.
const INIT_SCALE: f32 = 0.1;

/// Weighted-mean aggregation server.
#[derive(Debug)]
pub struct WeightedAggregator {
    shape: EmbeddingShape,
    /// Per-client sample counts used as aggregation weights.
    client_weights: Vec<u64>,
    policy: AnomalyPolicy,
    filter: NormOutlierFilter,
    global: Option<EmbeddingSnapshot>,
    rng: StdRng,
}

impl WeightedAggregator {
    /// Creates an aggregator for `client_weights.len()` clients.
    pub fn new(shape: EmbeddingShape, client_weights: Vec<u64>, policy: AnomalyPolicy, seed: u64) -> Self {
        Self {
            shape,
            client_weights,
            policy,
            filter: NormOutlierFilter::default(),
            global: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform per-client weights, for setups without sample-count metadata.
    pub fn with_uniform_weights(shape: EmbeddingShape, client_num: usize, policy: AnomalyPolicy, seed: u64) -> Self {
        Self::new(shape, vec![1; client_num], policy, seed)
    }

    /// Returns the current global embedding, if generated.
    pub fn global(&self) -> Option<&EmbeddingSnapshot> {
        self.global.as_ref()
    }
}

impl AggregationService for WeightedAggregator {
    fn generate_global_embedding(&mut self) -> Result<(), AggregateError> {
        info!(shape = %self.shape, "generating initial global embedding");
        self.global = Some(EmbeddingSnapshot::uniform(self.shape, INIT_SCALE, &mut self.rng));
        Ok(())
    }

    fn assign_embedding(&self) -> Result<SnapshotMap, AggregateError> {
        let global = self.global.as_ref().ok_or(AggregateError::NotInitialized)?;
        Ok((0..self.client_weights.len())
            .map(|i| (i, global.clone()))
            .collect())
    }

    fn aggregate_embedding(
        &mut self,
        snapshots: &SnapshotMap,
        byzantine_indices: &[usize],
    ) -> Result<(), AggregateError> {
        if snapshots.is_empty() {
            return Err(AggregateError::EmptySnapshotMap);
        }
        if self.client_weights.len() < snapshots.len() {
            return Err(AggregateError::WeightCountMismatch {
                weights: self.client_weights.len(),
                clients: snapshots.len(),
            });
        }
        for (&client, snapshot) in snapshots {
            // Keys index into the weight table; a sparse roster must fail
            // here, not as a panic in the weighting below.
            if client >= self.client_weights.len() {
                return Err(AggregateError::UnknownClient {
                    client,
                    clients: self.client_weights.len(),
                });
            }
            snapshot
                .check_shape(self.shape)
                .map_err(|_| AggregateError::ShapeMismatch {
                    client,
                    expected: self.shape,
                    actual: snapshot.shape(),
                })?;
        }

        // Trust filter: drop suspected Byzantine contributions first.
        let mut trusted: Vec<(usize, &EmbeddingSnapshot)> = snapshots
            .iter()
            .filter(|&(client, _)| !byzantine_indices.contains(client))
            .map(|(&client, snapshot)| (client, snapshot))
            .collect();

        // Anomaly filter: drop norm outliers among the remaining set.
        if self.policy != AnomalyPolicy::None {
            let norms: Vec<f64> = trusted.iter().map(|(_, s)| s.l2_norm()).collect();
            let outliers = self.filter.flag_outliers(&norms);
            if !outliers.is_empty() {
                let dropped: Vec<usize> =
                    outliers.iter().map(|&pos| trusted[pos].0).collect();
                warn!(policy = %self.policy, clients = ?dropped, "dropping anomalous contributions");
                let mut pos = 0;
                trusted.retain(|_| {
                    let keep = !outliers.contains(&pos);
                    pos += 1;
                    keep
                });
            }
        }

        if trusted.is_empty() {
            return Err(AggregateError::AllContributionsExcluded {
                total: snapshots.len(),
            });
        }

        let total_weight: f64 = trusted
            .iter()
            .map(|(client, _)| self.client_weights[*client] as f64)
            .sum();
        let mut aggregated =
            Array2::<f32>::zeros((self.shape.entities, self.shape.dim));
        for (client, snapshot) in &trusted {
            let factor = (self.client_weights[*client] as f64 / total_weight) as f32;
            aggregated = aggregated + snapshot.data() * factor;
        }

        debug!(
            contributions = trusted.len(),
            excluded = snapshots.len() - trusted.len(),
            "aggregated global embedding"
        );
        self.global = Some(EmbeddingSnapshot::new(aggregated));
        Ok(())
    }
}
