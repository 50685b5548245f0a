// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report assembly.
//!
//! Reads every run of one or more result sets, compares each variant's
//! latencies against the baseline, streams all per-request records through
//! the aggregator and writes `report.json` plus a markdown summary next to
//! the runs.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use overhead_bench_core::run::BASELINE;
use overhead_bench_core::Settings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::compare::LatencyDiff;
use crate::error::{Result, ResultsError};
use crate::io::{self, RunLocation};
use crate::plot::{Plot, PlotMatrix, Stall};
use crate::result::{variant_label, LatencyMetrics, LoadGenRecord, NamedResult, Options, SdkInfo, TestResult};

static SDK_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"sentry\.([^\s.]+)").ok());

/// Normalize an SDK identifier: `sentry.javascript.node` becomes
/// `sentry-javascript`. Unrecognized names are returned as is.
pub fn format_sdk_name(name: &str) -> String {
    match SDK_NAME.as_ref().and_then(|re| re.find(name)) {
        Some(m) => m.as_str().replace('.', "-"),
        None => name.to_string(),
    }
}

/// What was benchmarked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDetails {
    /// Platform language
    pub language: String,
    /// Platform framework
    pub framework: String,
    /// Normalized SDK name
    pub sdk_name: String,
    /// SDK version
    pub sdk_version: String,
}

impl AppDetails {
    /// Derive details from a run directory
    /// (`.../<language>/<framework>/<benchmark>/<variant>`) and the SDK the
    /// relay saw.
    pub fn from_run(run_path: &Path, sdk: &SdkInfo) -> Self {
        let component = |levels: usize| {
            run_path
                .ancestors()
                .nth(levels)
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            language: component(3),
            framework: component(2),
            sdk_name: format_sdk_name(&sdk.name),
            sdk_version: sdk.version.clone(),
        }
    }
}

/// Latencies of one run and their change against the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyEntry {
    /// Run name
    pub name: String,
    /// `None` for the baseline itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<LatencyDiff>,
    /// Raw percentiles
    pub metrics: LatencyMetrics,
}

/// One run as shown in the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunData {
    /// Run name
    pub name: String,
    /// Run directory
    pub path: PathBuf,
    /// HDR histogram export
    pub hdr: String,
    /// Throughput did not match the rate
    pub throughput_different: bool,
    /// Parsed result; per-request records are consumed by the aggregator
    pub result: TestResult,
}

impl RunData {
    /// View as a sanity-check input.
    pub fn to_named(&self) -> NamedResult {
        NamedResult {
            name: self.name.clone(),
            path: self.path.clone(),
            result: self.result.clone(),
        }
    }
}

/// Everything needed to render a benchmark report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Benchmark directory name, `<YYYYMMDD-HHMMSS>-<id>`
    pub id: String,
    /// Path of the first run
    pub title: String,
    /// Where outputs are written
    pub dir: PathBuf,
    /// Creation time
    pub generated_at: DateTime<Utc>,
    /// Any run saw request errors
    pub has_errors: bool,
    /// Benchmarked app, from the first run with SDK information
    pub app_details: Option<AppDetails>,
    /// Load options of the last run
    pub load_gen_options: Options,
    /// Baseline first, then the other runs in order
    pub latency: Vec<LatencyEntry>,
    /// Runs in discovery order
    pub runs: Vec<RunData>,
    /// Latency over time, all runs
    pub latency_plot: PlotMatrix,
    /// Attacks the aggregator could not fully flush
    pub stalls: Vec<Stall>,
}

impl Report {
    /// Directory holding `report.json` and `summary.md`.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.clone()
    }

    /// Runs as sanity-check inputs.
    pub fn named_results(&self) -> Vec<NamedResult> {
        self.runs.iter().map(RunData::to_named).collect()
    }
}

/// Build a report from already discovered runs.
pub async fn build_report(runs: Vec<RunLocation>, settings: &Settings) -> Result<Report> {
    let first = runs.first().ok_or_else(|| ResultsError::NoResults(Vec::new()))?;
    let title = first.path.display().to_string();
    let dir = first.path.parent().map(Path::to_path_buf).unwrap_or_default();
    let id = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut data = Vec::with_capacity(runs.len());
    let mut streams: Vec<(String, Vec<LoadGenRecord>)> = Vec::with_capacity(runs.len());
    for run in &runs {
        let mut result = io::read_test_result(&run.path.join(io::RESULT_FILE))?;
        let hdr = io::read_histogram(&run.path)?;
        streams.push((run.name.clone(), std::mem::take(&mut result.loadgen_result)));
        data.push(RunData {
            name: run.name.clone(),
            path: run.path.clone(),
            hdr,
            throughput_different: result.throughput_diverges(),
            result,
        });
    }

    let baseline = data.iter().find(|d| variant_label(&d.name) == BASELINE);
    if baseline.is_none() {
        warn!("no baseline run; latency differences omitted");
    }

    let mut latency = Vec::with_capacity(data.len());
    if let Some(b) = baseline {
        latency.push(LatencyEntry {
            name: b.name.clone(),
            diff: None,
            metrics: b.result.latencies,
        });
    }
    for d in &data {
        if baseline.is_some_and(|b| std::ptr::eq(b, d)) {
            continue;
        }
        let diff = match baseline {
            Some(b) => Some(LatencyDiff::between(&b.result.latencies, &d.result.latencies)?),
            None => None,
        };
        latency.push(LatencyEntry {
            name: d.name.clone(),
            diff,
            metrics: d.result.latencies,
        });
    }

    let app_details = data
        .iter()
        .find(|d| d.result.relay_metrics.sdk != SdkInfo::default())
        .map(|d| AppDetails::from_run(&first.path, &d.result.relay_metrics.sdk));

    let (latency_plot, stalls) = aggregate(streams, settings).await?;

    Ok(Report {
        id,
        title,
        dir,
        generated_at: Utc::now(),
        has_errors: data.iter().any(|d| d.result.has_errors()),
        app_details,
        load_gen_options: data.last().map(|d| d.result.options.clone()).unwrap_or_default(),
        latency,
        runs: data,
        latency_plot,
        stalls,
    })
}

/// Feed every record, relabelled with its run name, through a bounded
/// channel into the aggregator.
async fn aggregate(streams: Vec<(String, Vec<LoadGenRecord>)>, settings: &Settings) -> Result<(PlotMatrix, Vec<Stall>)> {
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    let producer = tokio::spawn(async move {
        for (attack, records) in streams {
            for record in &records {
                if tx.send(record.to_event(&attack)).await.is_err() {
                    return;
                }
            }
        }
    });

    let mut plot = Plot::new().with_max_pending(settings.max_pending_per_attack);
    let stalls = plot.drain(rx).await?;
    producer.await.map_err(|e| ResultsError::Task(e.to_string()))?;

    Ok((plot.to_matrix(settings.downsample_threshold), stalls))
}

/// Discover, build and write a report for the given result sets. Returns
/// the report and the path of its summary.
pub async fn generate(result_sets: &[PathBuf], settings: &Settings) -> Result<(Report, PathBuf)> {
    let runs = io::discover_runs(result_sets)?;
    info!(runs = runs.len(), "building report");
    let report = build_report(runs, settings).await?;
    let summary = io::write_all_outputs(&report)?;
    Ok((report, summary))
}
