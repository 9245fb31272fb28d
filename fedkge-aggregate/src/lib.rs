//! Embedding aggregation and robustness mechanisms for fedkge
//!
//! This crate covers the server side of a federation round:
//!
//! - [`AggregationService`] - the contract the round orchestrator drives:
//!   generate an initial global embedding, aggregate client snapshots, and
//!   assign the result back out
//! - [`WeightedAggregator`] - sample-count-weighted mean reference
//!   implementation with optional anomaly-detection filtering
//! - [`byzantine`] - simulation of malicious clients: index selection and
//!   snapshot perturbation before aggregation

pub mod anomaly;
pub mod byzantine;
pub mod service;
pub mod weighted;

pub use anomaly::{AnomalyPolicy, NormOutlierFilter};
pub use byzantine::{AttackMode, ByzantineError, ByzantinePlan};
pub use service::{AggregateError, AggregationService, SnapshotMap};
pub use weighted::WeightedAggregator;
