//! Per-client validation and test metric reports
//!
//! A [`MetricReport`] carries the retrieval-quality metrics of one client
//! for one validation or test pass, together with the sample count used as
//! the weight in cross-client averages. Every non-count metric is treated
//! identically by the reporter; `MRR` is the one the convergence tracker
//! keys on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric key for mean reciprocal rank.
pub const MRR_KEY: &str = "MRR";

/// Metric bag for one client and one validation/test pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// Named metric values (retrieval quality scores)
    metrics: BTreeMap<String, f64>,
    /// Number of evaluation samples, used as averaging weight
    sample_count: u64,
}

impl MetricReport {
    /// Creates an empty report with the given sample count.
    pub fn new(sample_count: u64) -> Self {
        Self {
            metrics: BTreeMap::new(),
            sample_count,
        }
    }

    /// Builder-style metric insertion.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Inserts or overwrites a metric value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    /// Returns a metric value by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Returns the mean reciprocal rank, if present.
    pub fn mrr(&self) -> Option<f64> {
        self.get(MRR_KEY)
    }

    /// Returns the sample count used as averaging weight.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Iterates over metric name/value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Returns the metric names in order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}
