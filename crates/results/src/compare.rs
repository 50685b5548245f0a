// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Comparison engine.
//!
//! Two levels of comparison:
//!
//! - within one benchmark, each variant's latency percentiles against the
//!   baseline ([`percent_diff`], [`LatencyDiff`]);
//! - across repeated benchmarks, every run's summary metrics grouped by
//!   variant and tested for significance ([`compare_across_runs`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CompareError, Result, ResultsError};
use crate::io;
use crate::result::{LatencyMetrics, TestResult};
use crate::stats::{self, MannWhitney, Summary};

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Percentage change from `baseline` to `candidate`, rounded to two
/// decimals. A zero baseline is an error.
pub fn percent_diff(baseline: Duration, candidate: Duration) -> std::result::Result<f64, CompareError> {
    percent_change("duration", baseline.as_nanos() as f64, candidate.as_nanos() as f64)
}

/// [`percent_diff`] for counters such as bytes or CPU nanoseconds.
pub fn percent_diff_u64(baseline: u64, candidate: u64) -> std::result::Result<f64, CompareError> {
    percent_change("counter", baseline as f64, candidate as f64)
}

fn percent_change(metric: &str, baseline: f64, candidate: f64) -> std::result::Result<f64, CompareError> {
    if baseline == 0.0 {
        return Err(CompareError::ZeroBaseline {
            metric: metric.to_string(),
        });
    }
    Ok(round2((candidate - baseline) / baseline * 100.0))
}

/// Per-percentile percentage change against a baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyDiff {
    /// Total latency change
    pub total: f64,
    /// Mean change
    pub mean: f64,
    /// p50 change
    pub p50: f64,
    /// p90 change
    pub p90: f64,
    /// p95 change
    pub p95: f64,
    /// p99 change
    pub p99: f64,
    /// Max change
    pub max: f64,
    /// Min change
    pub min: f64,
}

impl LatencyDiff {
    /// Compare every percentile of `candidate` against `baseline`.
    pub fn between(baseline: &LatencyMetrics, candidate: &LatencyMetrics) -> std::result::Result<Self, CompareError> {
        let diff = |metric: &str, b: Duration, c: Duration| {
            percent_diff(b, c).map_err(|_| CompareError::ZeroBaseline {
                metric: format!("latencies.{}", metric),
            })
        };
        Ok(Self {
            total: diff("total", baseline.total, candidate.total)?,
            mean: diff("mean", baseline.mean, candidate.mean)?,
            p50: diff("50th", baseline.p50, candidate.p50)?,
            p90: diff("90th", baseline.p90, candidate.p90)?,
            p95: diff("95th", baseline.p95, candidate.p95)?,
            p99: diff("99th", baseline.p99, candidate.p99)?,
            max: diff("max", baseline.max, candidate.max)?,
            min: diff("min", baseline.min, candidate.min)?,
        })
    }
}

/// One flattened summary metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Metric name, e.g. `Latencies50th`
    pub name: String,
    /// Value in `unit`
    pub value: f64,
    /// Unit
    pub unit: String,
}

impl MetricRecord {
    fn new(name: &str, value: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

/// Flatten a run's summary metrics.
pub fn metric_records(tr: &TestResult) -> Vec<MetricRecord> {
    let l = &tr.latencies;
    vec![
        MetricRecord::new("LatenciesTotal", l.total.as_secs_f64(), "s"),
        MetricRecord::new("LatenciesMean", millis(l.mean), "ms"),
        MetricRecord::new("Latencies50th", millis(l.p50), "ms"),
        MetricRecord::new("Latencies90th", millis(l.p90), "ms"),
        MetricRecord::new("Latencies95th", millis(l.p95), "ms"),
        MetricRecord::new("Latencies99th", millis(l.p99), "ms"),
        MetricRecord::new("LatenciesMax", millis(l.max), "ms"),
        MetricRecord::new("LatenciesMin", millis(l.min), "ms"),
        MetricRecord::new("Duration", millis(tr.duration), "ms"),
        MetricRecord::new("Wait", millis(tr.wait), "ms"),
        MetricRecord::new("Requests", tr.requests as f64, "req"),
        MetricRecord::new("Rate", tr.rate, "req/s"),
        MetricRecord::new("Throughput", tr.throughput, "req/s"),
    ]
}

/// Render a run's metrics in Go benchmark format, one
/// `Benchmark<Name> 1 <value> <unit>` line per metric.
pub fn to_bench_format(tr: &TestResult) -> String {
    let mut out = String::new();
    for r in metric_records(tr) {
        let _ = writeln!(out, "Benchmark{} 1 {} {}", r.name, r.value, r.unit);
    }
    out
}

/// Significance of one group against the reference group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Change of the mean, in percent; `None` when the reference mean is zero
    pub change_pct: Option<f64>,
    /// Test outcome
    pub test: MannWhitney,
}

impl Delta {
    /// True when the difference is unlikely to be noise.
    pub fn significant(&self) -> bool {
        self.test.significant()
    }
}

/// One metric across all groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    /// Metric name
    pub metric: String,
    /// Unit
    pub unit: String,
    /// Per group, in [`Comparison::groups`] order
    pub summaries: Vec<Option<Summary>>,
    /// Per group against the first group; `None` for the first group itself
    pub deltas: Vec<Option<Delta>>,
}

/// Cross-run comparison table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Group names, sorted
    pub groups: Vec<String>,
    /// One entry per metric
    pub metrics: Vec<MetricComparison>,
}

/// Group every `result.json` under `result_sets` by the name of its run
/// directory and compare the groups metric by metric.
///
/// Directories without a `result.json` are skipped; an unreadable one fails
/// the comparison. With more than two groups each is compared against the
/// lexicographically first.
pub fn compare_across_runs(result_sets: &[PathBuf]) -> Result<Comparison> {
    let mut grouped: BTreeMap<String, Vec<Vec<MetricRecord>>> = BTreeMap::new();

    for root in result_sets {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| ResultsError::Walk {
                root: root.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let result_file = entry.path().join(io::RESULT_FILE);
            if !result_file.is_file() {
                continue;
            }
            let tr = io::read_test_result(&result_file)?;
            let group = group_name(entry.path());
            debug!(group = %group, path = ?entry.path(), "collected run");
            grouped.entry(group).or_default().push(metric_records(&tr));
        }
    }

    if grouped.is_empty() {
        return Err(ResultsError::NoResults(result_sets.to_vec()));
    }
    Ok(build_comparison(&grouped))
}

fn group_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn build_comparison(grouped: &BTreeMap<String, Vec<Vec<MetricRecord>>>) -> Comparison {
    let groups: Vec<String> = grouped.keys().cloned().collect();

    // (metric, unit) in first-seen order
    let mut order: Vec<(String, String)> = Vec::new();
    for runs in grouped.values() {
        for record in runs.iter().flatten() {
            if !order.iter().any(|(m, _)| *m == record.name) {
                order.push((record.name.clone(), record.unit.clone()));
            }
        }
    }

    let samples = |group: &str, metric: &str| -> Vec<f64> {
        grouped
            .get(group)
            .map(|runs| {
                runs.iter()
                    .flatten()
                    .filter(|r| r.name == metric)
                    .map(|r| r.value)
                    .collect()
            })
            .unwrap_or_default()
    };

    let metrics = order
        .into_iter()
        .map(|(metric, unit)| {
            let per_group: Vec<Vec<f64>> = groups.iter().map(|g| samples(g, &metric)).collect();
            let summaries: Vec<Option<Summary>> = per_group.iter().map(|s| Summary::of(s)).collect();
            let reference = &per_group[0];
            let deltas = per_group
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    if i == 0 {
                        return None;
                    }
                    let test = stats::mann_whitney_u(reference, s)?;
                    let change_pct = match (summaries[0], summaries[i]) {
                        (Some(r), Some(c)) if r.mean != 0.0 => Some(round2((c.mean - r.mean) / r.mean * 100.0)),
                        _ => None,
                    };
                    Some(Delta { change_pct, test })
                })
                .collect();
            MetricComparison {
                metric,
                unit,
                summaries,
                deltas,
            }
        })
        .collect();

    Comparison { groups, metrics }
}

impl Comparison {
    /// Render as an aligned text table, one row per metric.
    pub fn to_text(&self) -> String {
        let mut header = vec!["name".to_string()];
        header.extend(self.groups.iter().cloned());
        if self.groups.len() > 1 {
            header.push("delta".to_string());
        }

        let mut rows = vec![header];
        for m in &self.metrics {
            let mut row = vec![format!("{} ({})", m.metric, m.unit)];
            for summary in &m.summaries {
                row.push(match summary {
                    Some(s) => format!("{:.4} ±{:.0}% n={}", s.mean, s.variation_pct, s.n),
                    None => "-".to_string(),
                });
            }
            if self.groups.len() > 1 {
                let cells: Vec<String> = m.deltas.iter().skip(1).map(format_delta).collect();
                row.push(cells.join(" | "));
            }
            rows.push(row);
        }

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| rows.iter().filter_map(|r| r.get(c)).map(|s| s.chars().count()).max().unwrap_or(0))
            .collect();

        let mut out = String::new();
        for row in rows {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(c, cell)| format!("{:<width$}", cell, width = widths[c]))
                .collect();
            let _ = writeln!(out, "{}", line.join("  ").trim_end());
        }
        out
    }
}

fn format_delta(delta: &Option<Delta>) -> String {
    match delta {
        Some(d) if d.significant() => match d.change_pct {
            Some(pct) => format!("{:+.2}% (p={:.3})", pct, d.test.p_value),
            None => format!("changed (p={:.3})", d.test.p_value),
        },
        Some(d) => format!("~ (p={:.3})", d.test.p_value),
        None => "-".to_string(),
    }
}
