//! Scripted client proxy
//!
//! Replays a fixed per-validation metric schedule, so a test can steer
//! the convergence tracker into any branch (improvement, regression,
//! early stop) without depending on the simulated training curve.

use tracing::debug;

use fedkge_model::{ClientProxy, EmbeddingSnapshot, MetricReport, ModelError};

/// Client proxy whose validation metrics follow a fixed script.
///
/// Each `valid` call consumes the next `(local_mrr, global_mrr)` pair;
/// past the end of the script the last pair repeats. Training applies no
/// drift, so the embedding observed by the server is exactly what
/// aggregation last assigned.
#[derive(Debug)]
pub struct ScriptedClient {
    index: usize,
    samples: u64,
    script: Vec<(f64, f64)>,
    valid_calls: usize,
    embedding: Option<EmbeddingSnapshot>,
    saved_at_valid_call: Option<usize>,
    /// Gate arguments seen on each train call, in order.
    pub train_gates: Vec<(bool, bool)>,
}

impl ScriptedClient {
    /// Creates a scripted client. The script must not be empty.
    pub fn new(index: usize, samples: u64, script: Vec<(f64, f64)>) -> Self {
        assert!(!script.is_empty(), "metric script must not be empty");
        Self {
            index,
            samples,
            script,
            valid_calls: 0,
            embedding: None,
            saved_at_valid_call: None,
            train_gates: Vec::new(),
        }
    }

    /// Builds a federation where every client shares the same script.
    pub fn federation(client_num: usize, script: Vec<(f64, f64)>) -> Vec<ScriptedClient> {
        (0..client_num)
            .map(|i| ScriptedClient::new(i, 100, script.clone()))
            .collect()
    }

    /// The validation call (1-based position) at which the latest
    /// checkpoint was taken, if any.
    pub fn saved_at_valid_call(&self) -> Option<usize> {
        self.saved_at_valid_call
    }

    fn current(&self) -> (f64, f64) {
        let position = self.valid_calls.min(self.script.len()).max(1) - 1;
        self.script[position]
    }

    fn report_for(&self, mrr: f64) -> MetricReport {
        MetricReport::new(self.samples).with_metric(fedkge_model::MRR_KEY, mrr)
    }

    fn require_embedding(&self) -> Result<&EmbeddingSnapshot, ModelError> {
        self.embedding
            .as_ref()
            .ok_or(ModelError::NotInitialized { client: self.index })
    }
}

impl ClientProxy for ScriptedClient {
    fn client_index(&self) -> usize {
        self.index
    }

    fn init_model(&mut self, initial_embedding: EmbeddingSnapshot) -> Result<(), ModelError> {
        self.embedding = Some(initial_embedding);
        Ok(())
    }

    fn train_round(&mut self) -> Result<MetricReport, ModelError> {
        self.train(true, true)?;
        self.valid_calls += 1;
        Ok(self.report_for(self.current().0))
    }

    fn train(
        &mut self,
        allow_global_to_local: bool,
        allow_local_to_global: bool,
    ) -> Result<(), ModelError> {
        self.require_embedding()?;
        self.train_gates
            .push((allow_global_to_local, allow_local_to_global));
        debug!(client = self.index, "scripted training round");
        Ok(())
    }

    fn entity_embedding(&self) -> Result<EmbeddingSnapshot, ModelError> {
        Ok(self.require_embedding()?.clone())
    }

    fn update_model(&mut self, entity_embedding: EmbeddingSnapshot) -> Result<(), ModelError> {
        let current = self.require_embedding()?;
        entity_embedding.check_shape(current.shape())?;
        self.embedding = Some(entity_embedding);
        Ok(())
    }

    fn valid(&mut self) -> Result<(MetricReport, MetricReport), ModelError> {
        self.require_embedding()?;
        self.valid_calls += 1;
        let (local, global) = self.current();
        Ok((self.report_for(local), self.report_for(global)))
    }

    fn test(&mut self) -> Result<MetricReport, ModelError> {
        self.require_embedding()?;
        Ok(self.report_for(self.current().0))
    }

    fn save_model(&mut self) -> Result<(), ModelError> {
        self.require_embedding()?;
        self.saved_at_valid_call = Some(self.valid_calls);
        Ok(())
    }

    fn load_model(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedkge_model::EmbeddingShape;

    #[test]
    fn test_script_replays_and_clamps() {
        let mut client = ScriptedClient::new(0, 100, vec![(0.1, 0.05), (0.2, 0.15)]);
        client
            .init_model(EmbeddingSnapshot::zeros(EmbeddingShape::new(2, 2)))
            .unwrap();

        let (local, _) = client.valid().unwrap();
        assert_eq!(local.mrr(), Some(0.1));
        let (local, global) = client.valid().unwrap();
        assert_eq!(local.mrr(), Some(0.2));
        assert_eq!(global.mrr(), Some(0.15));

        // Past the end of the script the last pair repeats.
        let (local, _) = client.valid().unwrap();
        assert_eq!(local.mrr(), Some(0.2));
    }

    #[test]
    fn test_test_reflects_latest_valid_position() {
        let mut client = ScriptedClient::new(0, 100, vec![(0.1, 0.05), (0.2, 0.15)]);
        client
            .init_model(EmbeddingSnapshot::zeros(EmbeddingShape::new(2, 2)))
            .unwrap();
        // Before any validation, the first entry is reported.
        assert_eq!(client.test().unwrap().mrr(), Some(0.1));
        client.valid().unwrap();
        client.valid().unwrap();
        assert_eq!(client.test().unwrap().mrr(), Some(0.2));
    }
}
