//! Client proxy interface and in-process simulated client
//!
//! The coordinator never touches raw training data; it drives clients
//! through the [`ClientProxy`] interface only. [`SimulatedClient`] is the
//! in-process implementation used by the simulation binary and the
//! integration tests: local training is modeled as a deterministic
//! improvement curve over rounds, and checkpointing keeps the best model
//! state in memory.

use tracing::{debug, warn};

use crate::report::{MetricReport, MRR_KEY};
use crate::snapshot::{EmbeddingSnapshot, ModelError};

/// Interface between the round orchestrator and one federation client.
///
/// Calls are mutually independent across clients; no client reads another's
/// state during its own call.
pub trait ClientProxy {
    /// Returns the client's index within the federation.
    fn client_index(&self) -> usize;

    /// Installs the initial entity embedding before the first round.
    fn init_model(&mut self, initial_embedding: EmbeddingSnapshot) -> Result<(), ModelError>;

    /// Runs one plain training round and reports its metrics.
    fn train_round(&mut self) -> Result<MetricReport, ModelError>;

    /// Runs one training round informed by the distillation gates.
    fn train(
        &mut self,
        allow_global_to_local: bool,
        allow_local_to_global: bool,
    ) -> Result<(), ModelError>;

    /// Reports the client's current entity embedding.
    fn entity_embedding(&self) -> Result<EmbeddingSnapshot, ModelError>;

    /// Accepts an updated entity embedding from the aggregation service.
    fn update_model(&mut self, entity_embedding: EmbeddingSnapshot) -> Result<(), ModelError>;

    /// Runs validation, returning (local, global) metric reports.
    fn valid(&mut self) -> Result<(MetricReport, MetricReport), ModelError>;

    /// Runs a test pass and reports its metrics.
    fn test(&mut self) -> Result<MetricReport, ModelError>;

    /// Persists the current model state as the client's best checkpoint.
    fn save_model(&mut self) -> Result<(), ModelError>;

    /// Restores the client's best checkpoint.
    fn load_model(&mut self) -> Result<(), ModelError>;
}

/// Saved model state for one client.
#[derive(Debug, Clone)]
struct Checkpoint {
    embedding: EmbeddingSnapshot,
    rounds_trained: u32,
}

/// Deterministic in-process federation client.
///
/// Retrieval quality follows a saturating curve over training rounds, so
/// repeated runs with the same configuration produce identical metrics.
/// `eta` controls how strongly `update_model` pulls the local embedding
/// toward the aggregated global one: 1.0 replaces it (FedAvg/FedProx),
/// 0.0 keeps the local embedding and relies on distillation only (FedDist).
#[derive(Debug)]
pub struct SimulatedClient {
    index: usize,
    valid_samples: u64,
    test_samples: u64,
    eta: f32,
    embedding: Option<EmbeddingSnapshot>,
    rounds_trained: u32,
    checkpoint: Option<Checkpoint>,
}

impl SimulatedClient {
    /// Per-round additive drift applied to the embedding during training.
    const TRAIN_DRIFT: f32 = 1e-3;

    /// Creates a simulated client.
    pub fn new(index: usize, valid_samples: u64, test_samples: u64, eta: f32) -> Self {
        Self {
            index,
            valid_samples,
            test_samples,
            eta,
            embedding: None,
            rounds_trained: 0,
            checkpoint: None,
        }
    }

    /// Builds a federation of `client_num` clients with staggered sample counts.
    pub fn federation(client_num: usize, eta: f32) -> Vec<SimulatedClient> {
        (0..client_num)
            .map(|i| SimulatedClient::new(i, 100 + 20 * i as u64, 80 + 10 * i as u64, eta))
            .collect()
    }

    /// Returns the number of training rounds this client has run.
    pub fn rounds_trained(&self) -> u32 {
        self.rounds_trained
    }

    fn require_embedding(&self) -> Result<&EmbeddingSnapshot, ModelError> {
        self.embedding
            .as_ref()
            .ok_or(ModelError::NotInitialized { client: self.index })
    }

    /// Saturating quality curve: strictly increasing in rounds, bounded by `cap`.
    fn quality(&self, cap: f64, half_life: f64) -> f64 {
        let r = f64::from(self.rounds_trained);
        cap * r / (r + half_life)
    }

    fn local_mrr(&self) -> f64 {
        self.quality(0.55 + 0.01 * self.index as f64, 6.0)
    }

    fn global_mrr(&self) -> f64 {
        self.quality(0.50 + 0.01 * self.index as f64, 8.0)
    }

    fn report_for(&self, mrr: f64, samples: u64) -> MetricReport {
        MetricReport::new(samples)
            .with_metric(MRR_KEY, mrr)
            .with_metric("HITS@10", (mrr * 1.7).min(0.95))
    }
}

impl ClientProxy for SimulatedClient {
    fn client_index(&self) -> usize {
        self.index
    }

    fn init_model(&mut self, initial_embedding: EmbeddingSnapshot) -> Result<(), ModelError> {
        debug!(
            client = self.index,
            shape = %initial_embedding.shape(),
            "initializing client model"
        );
        self.embedding = Some(initial_embedding);
        self.rounds_trained = 0;
        self.checkpoint = None;
        Ok(())
    }

    fn train_round(&mut self) -> Result<MetricReport, ModelError> {
        self.train(true, true)?;
        Ok(self.report_for(self.local_mrr(), self.test_samples))
    }

    fn train(
        &mut self,
        allow_global_to_local: bool,
        allow_local_to_global: bool,
    ) -> Result<(), ModelError> {
        self.require_embedding()?;
        self.rounds_trained += 1;
        debug!(
            client = self.index,
            round = self.rounds_trained,
            g2l = allow_global_to_local,
            l2g = allow_local_to_global,
            "local training round"
        );
        if let Some(embedding) = self.embedding.as_mut() {
            embedding.data_mut().mapv_inplace(|x| x + Self::TRAIN_DRIFT);
        }
        Ok(())
    }

    fn entity_embedding(&self) -> Result<EmbeddingSnapshot, ModelError> {
        Ok(self.require_embedding()?.clone())
    }

    fn update_model(&mut self, entity_embedding: EmbeddingSnapshot) -> Result<(), ModelError> {
        let current = self.require_embedding()?;
        entity_embedding.check_shape(current.shape())?;
        let eta = self.eta;
        let blended = current.data() * (1.0 - eta) + entity_embedding.data() * eta;
        self.embedding = Some(EmbeddingSnapshot::new(blended));
        Ok(())
    }

    fn valid(&mut self) -> Result<(MetricReport, MetricReport), ModelError> {
        self.require_embedding()?;
        let local = self.report_for(self.local_mrr(), self.valid_samples);
        let global = self.report_for(self.global_mrr(), self.valid_samples);
        Ok((local, global))
    }

    fn test(&mut self) -> Result<MetricReport, ModelError> {
        self.require_embedding()?;
        Ok(self.report_for(self.local_mrr(), self.test_samples))
    }

    fn save_model(&mut self) -> Result<(), ModelError> {
        let embedding = self.require_embedding()?.clone();
        debug!(client = self.index, round = self.rounds_trained, "saving checkpoint");
        self.checkpoint = Some(Checkpoint {
            embedding,
            rounds_trained: self.rounds_trained,
        });
        Ok(())
    }

    fn load_model(&mut self) -> Result<(), ModelError> {
        match self.checkpoint.as_ref() {
            Some(checkpoint) => {
                self.embedding = Some(checkpoint.embedding.clone());
                self.rounds_trained = checkpoint.rounds_trained;
                Ok(())
            }
            None => {
                // No checkpoint was ever written; the current weights are
                // the best available.
                warn!(client = self.index, "no checkpoint to restore");
                Ok(())
            }
        }
    }
}
