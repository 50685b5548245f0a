// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown summary of a benchmark report.

use std::fmt::{self, Write};
use std::time::Duration;

use crate::compare::{percent_diff_u64, LatencyDiff};
use crate::report::Report;

/// Format a byte count with SI units: `999 B`, `1.0 kB`, `2.5 MB`.
pub fn byte_count_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}

/// Truncate a latency for display: 10ms steps from half a second up (it
/// rounds to at least one second), 10us steps below.
pub fn format_latency(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos >= 500_000_000 {
        let step = 10_000_000;
        format!("{:.2}s", (nanos / step * step) as f64 / 1e9)
    } else {
        let step = 10_000;
        format!("{:.2}ms", (nanos / step * step) as f64 / 1e6)
    }
}

fn format_pct(p: f64) -> String {
    format!("{:+.2}%", p)
}

/// Generate a markdown summary from a report.
pub fn generate_summary(report: &Report) -> String {
    let mut output = String::new();
    // Writing into a String does not fail.
    let _ = write_summary(&mut output, report);
    output
}

fn write_summary(out: &mut String, report: &Report) -> fmt::Result {
    writeln!(out, "# Benchmark Report {}", report.id)?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", report.generated_at.to_rfc3339())?;
    writeln!(out)?;

    if let Some(app) = &report.app_details {
        writeln!(
            out,
            "**App:** {} / {}, SDK {} {}",
            app.language, app.framework, app.sdk_name, app.sdk_version
        )?;
        writeln!(out)?;
    }

    let opts = &report.load_gen_options;
    writeln!(
        out,
        "**Load:** {} req/s for {} (warmup {}) against `{}`",
        opts.rps,
        humanize(opts.test_duration),
        humanize(opts.warmup_duration),
        opts.target_url
    )?;
    writeln!(out)?;

    if report.has_errors {
        writeln!(out, "> **Warning:** the load generator observed request errors.")?;
        writeln!(out)?;
    }

    write_latency(out, report)?;
    write_runs(out, report)?;
    write_resources(out, report)?;

    if !report.stalls.is_empty() {
        writeln!(out, "## Incomplete series")?;
        writeln!(out)?;
        for stall in &report.stalls {
            writeln!(
                out,
                "- `{}`: {} results never plotted, sequence number {} missing",
                stall.attack, stall.pending, stall.waiting_for
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "---")?;
    writeln!(out, "Total runs: {}", report.runs.len())?;
    Ok(())
}

fn humanize(d: Duration) -> String {
    format!("{}s", d.as_secs_f64())
}

fn write_latency(out: &mut String, report: &Report) -> fmt::Result {
    writeln!(out, "## Latency")?;
    writeln!(out)?;
    writeln!(out, "| Run | Mean | p50 | p90 | p95 | p99 | Max | Min |")?;
    writeln!(out, "|-----|------|-----|-----|-----|-----|-----|-----|")?;
    for entry in &report.latency {
        let m = &entry.metrics;
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            entry.name,
            format_latency(m.mean),
            format_latency(m.p50),
            format_latency(m.p90),
            format_latency(m.p95),
            format_latency(m.p99),
            format_latency(m.max),
            format_latency(m.min),
        )?;
    }
    writeln!(out)?;

    let diffs: Vec<(&str, &LatencyDiff)> = report
        .latency
        .iter()
        .filter_map(|e| e.diff.as_ref().map(|d| (e.name.as_str(), d)))
        .collect();
    if diffs.is_empty() {
        return Ok(());
    }

    writeln!(out, "### Change against baseline")?;
    writeln!(out)?;
    writeln!(out, "| Run | Mean | p50 | p90 | p95 | p99 | Max | Min |")?;
    writeln!(out, "|-----|------|-----|-----|-----|-----|-----|-----|")?;
    for (name, d) in diffs {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            name,
            format_pct(d.mean),
            format_pct(d.p50),
            format_pct(d.p90),
            format_pct(d.p95),
            format_pct(d.p99),
            format_pct(d.max),
            format_pct(d.min),
        )?;
    }
    writeln!(out)
}

fn write_runs(out: &mut String, report: &Report) -> fmt::Result {
    writeln!(out, "## Runs")?;
    writeln!(out)?;
    writeln!(out, "| Run | Requests | Rate | Throughput | Success | Errors |")?;
    writeln!(out, "|-----|----------|------|------------|---------|--------|")?;
    for run in &report.runs {
        let tr = &run.result;
        let flag = if run.throughput_different { " ⚠" } else { "" };
        writeln!(
            out,
            "| {} | {} | {:.2}/s | {:.2}/s{} | {:.2}% | {} |",
            run.name,
            tr.requests,
            tr.rate,
            tr.throughput,
            flag,
            tr.success * 100.0,
            tr.errors.len()
        )?;
    }
    writeln!(out)
}

fn write_resources(out: &mut String, report: &Report) -> fmt::Result {
    if report.runs.iter().all(|r| r.result.container_stats.is_empty()) {
        return Ok(());
    }

    writeln!(out, "## Resources")?;
    writeln!(out)?;
    writeln!(out, "| Run | Container | CPU time | Memory before | Memory after | Memory change |")?;
    writeln!(out, "|-----|-----------|----------|---------------|--------------|---------------|")?;
    for run in &report.runs {
        for (container, stats) in &run.result.container_stats {
            let before = stats.before.memory_max_usage_bytes;
            let after = stats.after.memory_max_usage_bytes;
            let change = percent_diff_u64(before, after)
                .map(format_pct)
                .unwrap_or_else(|_| "n/a".to_string());
            let cpu = Duration::from_nanos(stats.difference.cpu_usage_total.max(0) as u64);
            writeln!(
                out,
                "| {} | {} | {:.2}s | {} | {} | {} |",
                run.name,
                container,
                cpu.as_secs_f64(),
                byte_count_si(before),
                byte_count_si(after),
                change
            )?;
        }
    }
    writeln!(out)
}
