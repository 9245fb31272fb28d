//! Embedding snapshots, metric reports, and client proxies for fedkge
//!
//! This crate defines the data exchanged between the coordinator and the
//! federation clients:
//!
//! - [`EmbeddingSnapshot`] - a client's entity-embedding tensor, the unit
//!   exchanged in every round
//! - [`MetricReport`] - a per-client validation/test metric bag with the
//!   sample count used as averaging weight
//! - [`ClientProxy`] - the interface the orchestrator drives; implemented
//!   in-process by [`SimulatedClient`]

pub mod client;
pub mod report;
pub mod snapshot;

pub use client::{ClientProxy, SimulatedClient};
pub use report::{MetricReport, MRR_KEY};
pub use snapshot::{EmbeddingShape, EmbeddingSnapshot, ModelError};
