//! Cross-client metric aggregation and logging
//!
//! Turns a set of per-client [`MetricReport`]s into sample-weighted
//! averages, logging each client's metrics along the way. Suspected
//! Byzantine clients can be excluded from the averages; excluding every
//! client is a loud error rather than a silently empty report.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use fedkge_model::MetricReport;

/// Errors produced when summarizing per-client metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// No reports were supplied at all.
    #[error("No metric reports to summarize for {label}")]
    EmptyReports {
        /// Report label, e.g. "Valid" or "Test"
        label: String,
    },

    /// Every client was excluded from the average.
    #[error("All {total} clients excluded from {label} metrics")]
    AllClientsExcluded {
        /// Report label
        label: String,
        /// Number of reports supplied
        total: usize,
    },

    /// A client's report is missing a metric another client reported.
    #[error("Client {client} report is missing metric {metric}")]
    MissingMetric {
        /// Client index within the report slice
        client: usize,
        /// Missing metric name
        metric: String,
    },

    /// The included clients carry no evaluation samples.
    #[error("Included clients for {label} have zero total samples")]
    ZeroSampleWeight {
        /// Report label
        label: String,
    },
}

/// Logs per-client metrics and returns the sample-weighted averages over
/// the non-excluded clients.
///
/// The metric keys of the first report define the summary's keys; a
/// later report missing one of them is an error. `excluded` holds client
/// indices (positions within `reports`) left out of the averages, while
/// their individual metrics are still logged.
pub fn summarize(
    label: &str,
    iter: usize,
    reports: &[MetricReport],
    excluded: &[usize],
) -> Result<BTreeMap<String, f64>, MetricsError> {
    if reports.is_empty() {
        return Err(MetricsError::EmptyReports {
            label: label.to_string(),
        });
    }

    for (client, report) in reports.iter().enumerate() {
        for (name, value) in report.iter() {
            info!(
                label,
                iter,
                client,
                metric = name,
                value,
                samples = report.sample_count(),
                "client metrics"
            );
        }
    }

    let included: Vec<(usize, &MetricReport)> = reports
        .iter()
        .enumerate()
        .filter(|(client, _)| !excluded.contains(client))
        .collect();
    if included.is_empty() {
        return Err(MetricsError::AllClientsExcluded {
            label: label.to_string(),
            total: reports.len(),
        });
    }

    let total_samples: u64 = included.iter().map(|(_, r)| r.sample_count()).sum();
    if total_samples == 0 {
        return Err(MetricsError::ZeroSampleWeight {
            label: label.to_string(),
        });
    }

    let mut summary = BTreeMap::new();
    for metric in reports[0].metric_names() {
        let mut weighted_sum = 0.0;
        for &(client, report) in &included {
            let value = report.get(metric).ok_or_else(|| MetricsError::MissingMetric {
                client,
                metric: metric.to_string(),
            })?;
            weighted_sum += value * report.sample_count() as f64;
        }
        let average = weighted_sum / total_samples as f64;
        info!(label, iter, metric, value = average, "weighted metrics");
        summary.insert(metric.to_string(), average);
    }

    Ok(summary)
}

/// Sample-weighted MRR over all reports, used as the convergence signal.
///
/// Unlike [`summarize`], no client is excluded and nothing is logged.
pub fn weighted_mrr(reports: &[MetricReport]) -> Result<f64, MetricsError> {
    if reports.is_empty() {
        return Err(MetricsError::EmptyReports {
            label: "convergence".to_string(),
        });
    }
    let total_samples: u64 = reports.iter().map(MetricReport::sample_count).sum();
    if total_samples == 0 {
        return Err(MetricsError::ZeroSampleWeight {
            label: "convergence".to_string(),
        });
    }
    let mut weighted_sum = 0.0;
    for (client, report) in reports.iter().enumerate() {
        let mrr = report.mrr().ok_or_else(|| MetricsError::MissingMetric {
            client,
            metric: fedkge_model::MRR_KEY.to_string(),
        })?;
        weighted_sum += mrr * report.sample_count() as f64;
    }
    Ok(weighted_sum / total_samples as f64)
}
