//! End-to-end federation round protocol scenarios
//!
//! Drives the orchestrator against the recording aggregation service and
//! both client implementations, asserting the protocol-level contract:
//! how many aggregation rounds run, which clients are distrusted, when
//! training gates close, and when early stopping fires.

use crate::{init_test_logging, small_run_config, RecordingAggregator, ScriptedClient};

use fedkge_aggregate::AttackMode;
use fedkge_fed::{FedMode, Orchestrator, Strategy};
use fedkge_model::{ClientProxy, SimulatedClient, MRR_KEY};

#[test]
fn test_gated_run_full_protocol() {
    init_test_logging();
    let config = small_run_config();

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.rounds_run, 3);
    assert!(!report.stopped_early);
    assert!(report.byzantine_indices.is_empty());
    assert!(report.test_metrics.contains_key(MRR_KEY));
    // Quality improves every round, so the last validated round wins.
    assert_eq!(report.best_iter, 2);

    let (server, clients) = orchestrator.into_parts();
    // One initial global embedding, then one aggregation per non-final round.
    assert_eq!(server.generate_calls, 1);
    assert_eq!(server.calls.len(), 2);
    // Initial assignment plus one redistribution per aggregation.
    assert_eq!(server.assign_calls.get(), 3);
    for call in &server.calls {
        assert!(call.byzantine_indices.is_empty());
        assert_eq!(call.snapshots.len(), 5);
    }
    for client in &clients {
        assert_eq!(client.rounds_trained(), 3);
    }
}

#[test]
fn test_early_stop_fires_and_closes_gates() {
    init_test_logging();
    let mut config = small_run_config();
    config.max_iter = 20;
    config.early_stop_iter = 2;

    // One improvement, then a permanent regression.
    let script = vec![(0.4, 0.3), (0.3, 0.2)];
    let clients = ScriptedClient::federation(config.client_num, script);
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    assert!(report.stopped_early);
    // Improvement at iter 0, bad rounds at iters 1 and 2, then the break.
    assert_eq!(report.rounds_run, 3);
    assert_eq!(report.best_iter, 0);

    let (server, clients) = orchestrator.into_parts();
    // The break happens before the round's aggregation.
    assert_eq!(server.calls.len(), 2);
    for client in &clients {
        // Both gates closed by the first non-improving validation round.
        assert_eq!(
            client.train_gates,
            vec![(true, true), (true, true), (false, false)]
        );
        // The only checkpoint was taken at the first validation pass.
        assert_eq!(client.saved_at_valid_call(), Some(1));
    }
}

#[test]
fn test_poison_uses_fixed_indices_without_mutation() {
    init_test_logging();
    let mut config = small_run_config();
    config.client_num = 10;
    config.byzantine = AttackMode::Poison;
    config.malicious_ratio = 0.4;
    config.max_iter = 2;

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.byzantine_indices, vec![0, 3, 6, 9]);

    let (server, _) = orchestrator.into_parts();
    assert_eq!(server.calls.len(), 1);
    assert_eq!(server.calls[0].byzantine_indices, vec![0, 3, 6, 9]);
    // Poisoning is a data-side attack: every submitted snapshot is the
    // client's honest training result (initial zeros plus one drift step).
    for snapshot in server.calls[0].snapshots.values() {
        assert!(snapshot.data().iter().all(|&x| (x - 1e-3).abs() < 1e-7));
    }
}

#[test]
fn test_random_noise_replaces_flagged_snapshots() {
    init_test_logging();
    let mut config = small_run_config();
    config.byzantine = AttackMode::RandomNoise;
    config.malicious_ratio = 0.4;
    config.max_iter = 2;

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    // floor(5 * 0.4) = 2 flagged clients, sorted.
    assert_eq!(report.byzantine_indices.len(), 2);
    assert!(report.byzantine_indices.windows(2).all(|w| w[0] < w[1]));

    let (server, _) = orchestrator.into_parts();
    assert_eq!(server.calls.len(), 1);
    let call = &server.calls[0];
    assert_eq!(call.byzantine_indices, report.byzantine_indices);

    for (client, snapshot) in &call.snapshots {
        if report.byzantine_indices.contains(client) {
            // Replaced with uniform noise; the honest constant is gone.
            assert!(snapshot.data().iter().all(|&x| (-0.1..=0.1).contains(&x)));
            assert!(snapshot.data().iter().any(|&x| (x - 1e-3).abs() > 1e-7));
        } else {
            assert!(snapshot.data().iter().all(|&x| (x - 1e-3).abs() < 1e-7));
        }
    }
}

#[test]
fn test_final_metrics_exclude_byzantine_clients() {
    init_test_logging();
    let mut config = small_run_config();
    config.byzantine = AttackMode::Poison;
    config.max_iter = 2;

    // Distinct constant local MRR per client, equal sample counts.
    let clients: Vec<ScriptedClient> = (0..5)
        .map(|i| ScriptedClient::new(i, 100, vec![(0.1 * (i + 1) as f64, 0.05)]))
        .collect();
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    // Five clients always map to the fixed suspect set {0, 3}.
    assert_eq!(report.byzantine_indices, vec![0, 3]);
    // Weighted test MRR over clients 1, 2, 4: (0.2 + 0.3 + 0.5) / 3.
    assert!((report.test_metrics[MRR_KEY] - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_plain_averaging_skips_robustness() {
    init_test_logging();
    let mut config = small_run_config();
    config.strategy = Strategy::PlainAveraging;
    config.aggregate_iteration = 4;
    // Ignored by the plain loop even when configured.
    config.byzantine = AttackMode::Poison;

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.rounds_run, 4);
    assert!(!report.stopped_early);
    assert!(report.byzantine_indices.is_empty());

    let (server, clients) = orchestrator.into_parts();
    // No aggregation after the final round, no distrusted clients ever.
    assert_eq!(server.calls.len(), 3);
    assert!(server.calls.iter().all(|c| c.byzantine_indices.is_empty()));
    for client in &clients {
        assert_eq!(client.rounds_trained(), 4);
    }
}

#[test]
fn test_feddist_run_never_overwrites_local_models() {
    init_test_logging();
    let mut config = small_run_config();
    config.fed_mode = FedMode::FedDist;
    config.max_iter = 2;

    let clients = SimulatedClient::federation(config.client_num, config.eta());
    let server = RecordingAggregator::new(config.embedding_shape(), config.client_num);
    let mut orchestrator = Orchestrator::new(config, server, clients).unwrap();
    orchestrator.initialize().unwrap();
    orchestrator.run().unwrap();

    let (_, clients) = orchestrator.into_parts();
    // eta = 0: the restored checkpoints carry pure local drift from the
    // zero initialization, untouched by the aggregation round.
    for client in &clients {
        let rounds = client.rounds_trained() as f32;
        let embedding = client.entity_embedding().unwrap();
        assert!(embedding
            .data()
            .iter()
            .all(|&x| (x - rounds * 1e-3).abs() < 1e-6));
    }
}
