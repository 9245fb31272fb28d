//! Convergence tracking and distillation gating
//!
//! Tracks the best weighted local and global MRR seen so far, decides
//! each validation round whether the run improved, and drives the two
//! distillation gates. Both gates are monotone: once a direction is
//! disabled it stays disabled for the rest of the run.
//!
//! Checkpoint selection is split per direction. The run-level decision
//! (best iteration, patience counter) follows the weighted averages,
//! while each client keeps its own local watermark so that a client
//! whose local model peaked earlier does not lose its best checkpoint
//! to a later, worse round.

use tracing::{debug, info};

/// Minimal weighted-MRR gain still counted as progress when deciding
/// whether to keep a distillation direction open.
const IMPROVEMENT_EPS: f64 = 1e-3;

/// Outcome of one convergence update.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundDecision {
    /// Whether either best advanced this round
    pub improved: bool,
    /// Clients whose local watermark advanced and should checkpoint now
    pub clients_to_save: Vec<usize>,
}

/// Convergence state for one run.
#[derive(Debug, Clone)]
pub struct ConvergenceState {
    best_local_mrr: f64,
    best_global_mrr: f64,
    best_iter: usize,
    bad_iter: usize,
    allow_global_to_local: bool,
    allow_local_to_global: bool,
    local_watermarks: Vec<f64>,
}

impl ConvergenceState {
    /// Fresh state: zero bests, both gates open, one watermark per client.
    pub fn new(client_num: usize) -> Self {
        Self {
            best_local_mrr: 0.0,
            best_global_mrr: 0.0,
            best_iter: 0,
            bad_iter: 0,
            allow_global_to_local: true,
            allow_local_to_global: true,
            local_watermarks: vec![0.0; client_num],
        }
    }

    /// Iteration that produced the best weighted metrics so far.
    pub fn best_iter(&self) -> usize {
        self.best_iter
    }

    /// Consecutive non-improving validation rounds.
    pub fn bad_iter(&self) -> usize {
        self.bad_iter
    }

    /// Whether the global model may still overwrite local embeddings.
    pub fn allow_global_to_local(&self) -> bool {
        self.allow_global_to_local
    }

    /// Whether local models may still feed the global aggregate.
    pub fn allow_local_to_global(&self) -> bool {
        self.allow_local_to_global
    }

    /// Whether the patience budget is exhausted.
    pub fn should_stop(&self, early_stop_iter: usize) -> bool {
        self.bad_iter >= early_stop_iter
    }

    /// Applies one validation round's weighted MRRs.
    ///
    /// `per_client_local_mrr` carries every client's own local MRR and
    /// drives the split checkpoint watermarks; ties (>=) still save, so
    /// a plateaued client refreshes its checkpoint rather than keeping a
    /// stale one.
    pub fn update(
        &mut self,
        iter: usize,
        wait_iter: usize,
        local_mrr: f64,
        global_mrr: f64,
        per_client_local_mrr: &[f64],
    ) -> RoundDecision {
        let local_gain = local_mrr - self.best_local_mrr;
        let global_gain = global_mrr - self.best_global_mrr;

        // After the warm-up, a stalled direction closes local-to-global
        // before the best-tracking below runs.
        if (local_gain <= IMPROVEMENT_EPS || global_gain <= IMPROVEMENT_EPS)
            && iter >= wait_iter
            && self.allow_local_to_global
        {
            info!(iter, "closing local-to-global distillation");
            self.allow_local_to_global = false;
        }

        let local_improved = local_mrr > self.best_local_mrr;
        let global_improved = global_mrr > self.best_global_mrr;

        let improved = match (local_improved, global_improved) {
            (true, true) => {
                self.best_local_mrr = local_mrr;
                self.best_global_mrr = global_mrr;
                self.record_best(iter);
                true
            }
            (false, true) => {
                self.best_global_mrr = global_mrr;
                self.record_best(iter);
                if self.allow_local_to_global {
                    info!(iter, "closing local-to-global distillation");
                    self.allow_local_to_global = false;
                }
                true
            }
            (true, false) => {
                self.best_local_mrr = local_mrr;
                self.record_best(iter);
                if self.allow_global_to_local {
                    info!(iter, "closing global-to-local distillation");
                    self.allow_global_to_local = false;
                }
                true
            }
            (false, false) => {
                if self.allow_local_to_global || self.allow_global_to_local {
                    info!(iter, "closing both distillation directions");
                }
                self.allow_local_to_global = false;
                self.allow_global_to_local = false;
                self.bad_iter += 1;
                debug!(bad_iter = self.bad_iter, "no improvement this round");
                false
            }
        };

        let clients_to_save = if improved {
            self.split_save(per_client_local_mrr)
        } else {
            Vec::new()
        };

        RoundDecision {
            improved,
            clients_to_save,
        }
    }

    fn record_best(&mut self, iter: usize) {
        self.best_iter = iter;
        self.bad_iter = 0;
        info!(
            iter,
            best_local = self.best_local_mrr,
            best_global = self.best_global_mrr,
            "new best checkpoint round"
        );
    }

    fn split_save(&mut self, per_client_local_mrr: &[f64]) -> Vec<usize> {
        let mut save = Vec::new();
        for (client, &mrr) in per_client_local_mrr.iter().enumerate() {
            if mrr >= self.local_watermarks[client] {
                self.local_watermarks[client] = mrr;
                save.push(client);
            }
        }
        save
    }
}
