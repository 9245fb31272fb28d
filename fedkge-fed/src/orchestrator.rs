//! Round orchestration
//!
//! Drives a full federation run against a set of [`ClientProxy`]s and an
//! [`AggregationService`]. Two strategies exist: the gated/robust pipeline
//! with convergence tracking, early stopping, and Byzantine simulation,
//! and a plain periodic-averaging loop without any of that.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use fedkge_aggregate::{
    AggregateError, AggregationService, ByzantineError, ByzantinePlan, SnapshotMap,
};
use fedkge_model::{ClientProxy, MetricReport, ModelError};

use crate::config::{ConfigError, RunConfig, Strategy};
use crate::convergence::ConvergenceState;
use crate::reporter::{self, MetricsError};

/// Errors raised while driving a federation run.
#[derive(Debug, Error)]
pub enum FedError {
    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A client-side operation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// An aggregation-side operation failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Byzantine simulation failed.
    #[error(transparent)]
    Byzantine(#[from] ByzantineError),

    /// Metric summarization failed.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// The client roster does not match the configuration.
    #[error("Configuration expects {expected} clients, got {actual}")]
    ClientCountMismatch {
        /// Configured client count
        expected: usize,
        /// Supplied client count
        actual: usize,
    },

    /// The aggregation service returned no embedding for a client.
    #[error("No assigned embedding for client {client}")]
    MissingAssignment {
        /// Client index
        client: usize,
    },

    /// A client's reported index does not match its roster position.
    #[error("Client at roster position {position} reports index {index}")]
    MisorderedRoster {
        /// Position in the supplied roster
        position: usize,
        /// Index the client reported
        index: usize,
    },
}

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct FinalReport {
    /// Iteration with the best weighted validation metrics
    pub best_iter: usize,
    /// Number of training rounds actually executed
    pub rounds_run: usize,
    /// Whether the patience budget ended the run before `max_iter`
    pub stopped_early: bool,
    /// Weighted test metrics after restoring the best checkpoints
    pub test_metrics: BTreeMap<String, f64>,
    /// Materialized Byzantine client indices (empty when no attack)
    pub byzantine_indices: Vec<usize>,
}

/// Federation run driver.
pub struct Orchestrator<A, C> {
    config: RunConfig,
    server: A,
    clients: Vec<C>,
    rng: StdRng,
}

impl<A: AggregationService, C: ClientProxy> Orchestrator<A, C> {
    /// Validates the configuration and binds the server and clients.
    pub fn new(config: RunConfig, server: A, clients: Vec<C>) -> Result<Self, FedError> {
        config.validate()?;
        if clients.len() != config.client_num {
            return Err(FedError::ClientCountMismatch {
                expected: config.client_num,
                actual: clients.len(),
            });
        }
        // Checkpointing and metric exclusion address clients by roster
        // position; snapshots and assignments by reported index. Both must
        // agree or Byzantine exclusions would hit the wrong clients.
        for (position, client) in clients.iter().enumerate() {
            if client.client_index() != position {
                return Err(FedError::MisorderedRoster {
                    position,
                    index: client.client_index(),
                });
            }
        }
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!(seed, strategy = %config.strategy, fed_mode = %config.fed_mode, "orchestrator ready");
        Ok(Self {
            config,
            server,
            clients,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Generates the initial global embedding and installs it on every client.
    pub fn initialize(&mut self) -> Result<(), FedError> {
        self.server.generate_global_embedding()?;
        let mut assigned = self.server.assign_embedding()?;
        for client in &mut self.clients {
            let index = client.client_index();
            let snapshot = assigned
                .remove(&index)
                .ok_or(FedError::MissingAssignment { client: index })?;
            client.init_model(snapshot)?;
        }
        Ok(())
    }

    /// Runs the configured strategy to completion.
    pub fn run(&mut self) -> Result<FinalReport, FedError> {
        match self.config.strategy {
            Strategy::GatedRobust => self.run_gated(),
            Strategy::PlainAveraging => self.run_plain(),
        }
    }

    /// Gated-distillation pipeline with convergence tracking, early stop,
    /// and Byzantine simulation.
    fn run_gated(&mut self) -> Result<FinalReport, FedError> {
        let config = self.config.clone();
        let mut convergence = ConvergenceState::new(config.client_num);
        let mut plan = ByzantinePlan::new(
            config.byzantine,
            config.malicious_ratio,
            config.apply_probability,
        );

        // Baseline test report before any training; no client is suspect yet.
        let baseline = self.collect_tests()?;
        reporter::summarize("Test", 0, &baseline, plan.indices())?;

        let mut rounds_run = 0;
        let mut stopped_early = false;

        for iter in 0..config.max_iter {
            let mut snapshots: SnapshotMap = SnapshotMap::new();
            for client in &mut self.clients {
                client.train(
                    convergence.allow_global_to_local(),
                    convergence.allow_local_to_global(),
                )?;
                snapshots.insert(client.client_index(), client.entity_embedding()?);
            }
            rounds_run += 1;

            if iter % config.valid_iter == 0 {
                self.validate_round(iter, &config, &mut convergence, &plan)?;
            }

            if convergence.should_stop(config.early_stop_iter) {
                info!(
                    iter,
                    bad_iter = convergence.bad_iter(),
                    "patience exhausted, stopping early"
                );
                stopped_early = true;
                break;
            }

            plan.materialize_once(config.client_num, &mut self.rng)?;
            let apply_flags = plan.draw_apply_flags(&mut self.rng);

            // The final round's training result is what gets tested; no
            // aggregation follows it.
            if iter != config.max_iter - 1 {
                plan.inject(&mut snapshots, &apply_flags, &mut self.rng)?;
                self.server.aggregate_embedding(&snapshots, plan.indices())?;
                let mut assigned = self.server.assign_embedding()?;
                for client in &mut self.clients {
                    let index = client.client_index();
                    let snapshot = assigned
                        .remove(&index)
                        .ok_or(FedError::MissingAssignment { client: index })?;
                    client.update_model(snapshot)?;
                }
            }
        }

        for client in &mut self.clients {
            client.load_model()?;
        }
        let tests = self.collect_tests()?;
        let test_metrics =
            reporter::summarize("Test", convergence.best_iter(), &tests, plan.indices())?;

        Ok(FinalReport {
            best_iter: convergence.best_iter(),
            rounds_run,
            stopped_early,
            test_metrics,
            byzantine_indices: plan.indices().to_vec(),
        })
    }

    fn validate_round(
        &mut self,
        iter: usize,
        config: &RunConfig,
        convergence: &mut ConvergenceState,
        plan: &ByzantinePlan,
    ) -> Result<(), FedError> {
        let mut local_valids = Vec::with_capacity(config.client_num);
        let mut global_valids = Vec::with_capacity(config.client_num);
        for client in &mut self.clients {
            let (local, global) = client.valid()?;
            local_valids.push(local);
            global_valids.push(global);
        }
        reporter::summarize("Valid/local", iter, &local_valids, plan.indices())?;
        reporter::summarize("Valid/global", iter, &global_valids, plan.indices())?;

        // The convergence signal deliberately spans every client, suspect
        // or not; only the reported test averages exclude suspects.
        let local_mrr = reporter::weighted_mrr(&local_valids)?;
        let global_mrr = reporter::weighted_mrr(&global_valids)?;
        let per_client: Vec<f64> = local_valids
            .iter()
            .enumerate()
            .map(|(client, report)| {
                report.mrr().ok_or_else(|| MetricsError::MissingMetric {
                    client,
                    metric: fedkge_model::MRR_KEY.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;

        let decision = convergence.update(
            iter,
            config.wait_iter,
            local_mrr,
            global_mrr,
            &per_client,
        );
        for &client in &decision.clients_to_save {
            self.clients[client].save_model()?;
        }
        debug!(
            iter,
            improved = decision.improved,
            saved = decision.clients_to_save.len(),
            "validation round complete"
        );

        let tests = self.collect_tests()?;
        reporter::summarize("Test", iter, &tests, plan.indices())?;
        Ok(())
    }

    /// Plain periodic averaging without gating, robustness, or early stop.
    fn run_plain(&mut self) -> Result<FinalReport, FedError> {
        let config = self.config.clone();
        let mut rounds_run: usize = 0;
        let mut test_metrics = BTreeMap::new();

        for iter in 0..config.aggregate_iteration {
            let mut snapshots: SnapshotMap = SnapshotMap::new();
            let mut metrics = Vec::with_capacity(config.client_num);
            for client in &mut self.clients {
                metrics.push(client.train_round()?);
                snapshots.insert(client.client_index(), client.entity_embedding()?);
            }
            rounds_run += 1;
            test_metrics = reporter::summarize("Test after local training", iter, &metrics, &[])?;

            if iter != config.aggregate_iteration - 1 {
                self.server.aggregate_embedding(&snapshots, &[])?;
                let mut assigned = self.server.assign_embedding()?;
                for client in &mut self.clients {
                    let index = client.client_index();
                    let snapshot = assigned
                        .remove(&index)
                        .ok_or(FedError::MissingAssignment { client: index })?;
                    client.update_model(snapshot)?;
                }
            }
        }

        Ok(FinalReport {
            best_iter: rounds_run.saturating_sub(1),
            rounds_run,
            stopped_early: false,
            test_metrics,
            byzantine_indices: Vec::new(),
        })
    }

    fn collect_tests(&mut self) -> Result<Vec<MetricReport>, FedError> {
        let mut tests = Vec::with_capacity(self.clients.len());
        for client in &mut self.clients {
            tests.push(client.test()?);
        }
        Ok(tests)
    }

    /// Consumes the orchestrator, returning the server and clients.
    pub fn into_parts(self) -> (A, Vec<C>) {
        (self.server, self.clients)
    }
}

impl<A, C> Orchestrator<A, C> {
    /// Run configuration this orchestrator was built with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}
