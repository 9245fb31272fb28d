//! Round orchestration and robustness control for fedkge
//!
//! This crate is the coordinator core of the federated knowledge-graph
//! embedding simulator:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Round Orchestrator                          │
//! │  for each round:                                                 │
//! │    train every client ──► collect embedding snapshots            │
//! │    every valid_iter:  validate ──► convergence tracker ──► test  │
//! │    early-stop check                                              │
//! │    byzantine injection ──► aggregate ──► redistribute            │
//! │  restore best checkpoints ──► final test report                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`RunConfig`] - validated run parameters; string mode tags resolve to
//!   closed enums once, before any round executes
//! - [`ConvergenceState`] - local/global best tracking, distillation gate
//!   control, early-stop patience, and per-client checkpoint watermarks
//! - [`reporter`] - per-client metric logging and Byzantine-excluded
//!   weighted averages
//! - [`Orchestrator`] - the round protocol itself, in gated/robust and
//!   plain-averaging variants

pub mod config;
pub mod convergence;
pub mod orchestrator;
pub mod reporter;

pub use config::{load_run_config, ConfigError, FedMode, RunConfig, Strategy};
pub use convergence::{ConvergenceState, RoundDecision};
pub use orchestrator::{FedError, FinalReport, Orchestrator};
pub use reporter::MetricsError;
