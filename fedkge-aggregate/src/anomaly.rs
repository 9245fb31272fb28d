//! Anomaly-detection policy for aggregation
//!
//! When a policy other than [`AnomalyPolicy::None`] is configured, the
//! aggregator additionally drops contributions whose embedding-norm z-score
//! exceeds a threshold before computing the weighted mean. This simulation
//! uses the same norm-statistics filter for every named policy; the policy
//! name is part of the run configuration so result logs record which model
//! a run was meant to evaluate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Named anomaly-detection policy, passed through to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnomalyPolicy {
    /// No anomaly filtering (default)
    #[default]
    None,
    /// Isolation-forest style outlier filtering
    #[serde(rename = "IsolationForest", alias = "IF")]
    IsolationForest,
    /// ECOD (empirical cumulative distribution) style filtering
    #[serde(rename = "ECOD")]
    Ecod,
}

impl fmt::Display for AnomalyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyPolicy::None => write!(f, "None"),
            AnomalyPolicy::IsolationForest => write!(f, "IsolationForest"),
            AnomalyPolicy::Ecod => write!(f, "ECOD"),
        }
    }
}

impl FromStr for AnomalyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" | "none" => Ok(AnomalyPolicy::None),
            "IsolationForest" | "IF" => Ok(AnomalyPolicy::IsolationForest),
            "ECOD" | "ecod" => Ok(AnomalyPolicy::Ecod),
            _ => Err(format!("unknown anomaly detection policy: {s}")),
        }
    }
}

/// Z-score outlier filter over contribution norms.
///
/// For each candidate value, computes `|value - mean| / std_dev` over the
/// candidate set and flags values whose z-score exceeds the threshold.
#[derive(Debug, Clone)]
pub struct NormOutlierFilter {
    threshold: f64,
}

impl Default for NormOutlierFilter {
    fn default() -> Self {
        Self { threshold: 2.5 }
    }
}

impl NormOutlierFilter {
    /// Creates a filter with a custom z-score threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the positions in `norms` flagged as outliers.
    ///
    /// With fewer than three candidates, or zero variance, nothing is
    /// flagged: there is no meaningful distribution to deviate from.
    pub fn flag_outliers(&self, norms: &[f64]) -> Vec<usize> {
        if norms.len() < 3 {
            return Vec::new();
        }

        let n = norms.len() as f64;
        let mean = norms.iter().sum::<f64>() / n;
        let variance = norms.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std_dev = variance.max(0.0).sqrt();
        if std_dev == 0.0 {
            return Vec::new();
        }

        let flagged: Vec<usize> = norms
            .iter()
            .enumerate()
            .filter(|(_, &v)| ((v - mean) / std_dev).abs() > self.threshold)
            .map(|(i, _)| i)
            .collect();

        if !flagged.is_empty() {
            debug!(
                flagged = flagged.len(),
                mean,
                std_dev,
                threshold = self.threshold,
                "anomaly filter flagged contributions"
            );
        }
        flagged
    }
}
