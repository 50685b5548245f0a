// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end processing of a benchmark artifact tree.

use overhead_bench_core::Settings;
use overhead_bench_results::io::{HISTOGRAM_FILE, REPORT_FILE, RESULT_FILE, SUMMARY_FILE};
use overhead_bench_results::plot::X_LABEL;
use overhead_bench_results::{compare_across_runs, report, sanity};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn app_response() -> String {
    let items: Vec<Value> = (1..=10).map(|i| json!({"id": i, "randomNumber": i * 37})).collect();
    format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{}", json!(items))
}

fn envelope() -> String {
    let spans: Vec<Value> = (0..25).map(|i| json!({"op": "db", "span_id": i})).collect();
    format!(
        "POST /api/1/envelope/ HTTP/1.1\r\nHost: fakerelay\r\n\r\n{}\n{}\n{}",
        json!({"event_id": "abc"}),
        json!({"type": "transaction"}),
        json!({"transaction": "/update", "spans": spans})
    )
}

/// Records arrive out of dispatch order, as the load generator writes them.
fn records(latency_ms: u64) -> Vec<Value> {
    [2u64, 0, 1, 4, 3]
        .iter()
        .map(|&seq| {
            json!({
                "attack": "",
                "seq": seq,
                "code": 200,
                "timestamp": format!("2021-09-23T15:29:31.{:03}Z", seq * 10),
                "latency": (latency_ms + seq) * 1_000_000,
                "error": "",
            })
        })
        .collect()
}

fn write_run(dir: &Path, latency_ms: u64, relay: Value) {
    fs::create_dir_all(dir).unwrap();
    let result = json!({
        "latencies": {
            "total": latency_ms * 5 * 1_000_000,
            "mean": latency_ms * 1_000_000,
            "50th": latency_ms * 1_000_000,
            "90th": (latency_ms + 3) * 1_000_000,
            "95th": (latency_ms + 4) * 1_000_000,
            "99th": (latency_ms + 4) * 1_000_000,
            "max": (latency_ms + 4) * 1_000_000,
            "min": latency_ms * 1_000_000
        },
        "requests": 5,
        "rate": 100.0,
        "throughput": 99.8,
        "success": 1.0,
        "errors": null,
        "loadgen_result": records(latency_ms),
        "container_stats": {
            "app": {
                "before": {"memory_max_usage_bytes": 1_000_000u64},
                "after": {"memory_max_usage_bytes": 1_500_000u64},
                "difference": {"cpu_usage_total": 2_000_000_000i64}
            }
        },
        "relay_metrics": relay,
        "FirstAppResponse": app_response(),
        "options": {"rps": 100, "test_duration": 5_000_000_000u64, "target_url": "http://app:8080/update"}
    });
    fs::write(dir.join(RESULT_FILE), serde_json::to_string(&result).unwrap()).unwrap();
    fs::write(dir.join(HISTOGRAM_FILE), "Value Percentile TotalCount\n").unwrap();
}

fn benchmark(root: &Path, name: &str, baseline_ms: u64, instrumented_ms: u64) -> PathBuf {
    let dir = root.join("python").join("django").join(name);
    write_run(&dir.join("baseline"), baseline_ms, Value::Null);
    write_run(
        &dir.join("instrumented"),
        instrumented_ms,
        json!({
            "requests": 12,
            "bytes_received": 4096,
            "first_request": envelope(),
            "sdk": {"name": "sentry.python", "version": "1.4.0"}
        }),
    );
    dir
}

#[tokio::test]
async fn test_report_from_artifact_tree() {
    let tmp = TempDir::new().unwrap();
    let dir = benchmark(tmp.path(), "20210923-152931-snbclwa", 100, 115);

    let (report, summary) = report::generate(&[dir.clone()], &Settings::default()).await.unwrap();

    assert_eq!(report.id, "20210923-152931-snbclwa");
    assert_eq!(report.dir, dir);
    assert!(!report.has_errors);
    assert!(report.stalls.is_empty());

    let names: Vec<_> = report.latency.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["baseline", "instrumented"]);
    assert!(report.latency[0].diff.is_none());
    assert_eq!(report.latency[1].diff.unwrap().mean, 15.0);

    let app = report.app_details.as_ref().unwrap();
    assert_eq!(app.language, "python");
    assert_eq!(app.framework, "django");
    assert_eq!(app.sdk_name, "sentry-python");

    let plot = &report.latency_plot;
    assert_eq!(plot.labels, vec![X_LABEL, "baseline: OK", "instrumented: OK"]);
    assert_eq!(plot.rows.len(), 10);
    assert!(plot.rows.windows(2).all(|w| w[0][0] <= w[1][0]));
    let baseline_series: Vec<f64> = plot.rows.iter().map(|r| r[1]).filter(|v| !v.is_nan()).collect();
    assert_eq!(baseline_series, vec![100.0, 101.0, 102.0, 103.0, 104.0]);

    assert_eq!(summary, dir.join(SUMMARY_FILE));
    let markdown = fs::read_to_string(&summary).unwrap();
    assert!(markdown.contains("# Benchmark Report 20210923-152931-snbclwa"));
    assert!(markdown.contains("| instrumented | +15.00% |"));
    assert!(markdown.contains("1.0 MB"));

    let written: Value = serde_json::from_str(&fs::read_to_string(dir.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(written["id"], "20210923-152931-snbclwa");
    assert_eq!(written["latency_plot"]["rows"][0][2], Value::Null);

    let checked = sanity::check(&report.named_results(), &sanity::SanityPolicy::default());
    assert!(checked.is_ok(), "{:?}", checked);
}

#[tokio::test]
async fn test_report_rejects_malformed_result() {
    let tmp = TempDir::new().unwrap();
    let dir = benchmark(tmp.path(), "20210923-152931-aaaaaaa", 100, 110);
    fs::write(dir.join("instrumented").join(RESULT_FILE), "{").unwrap();

    let err = report::generate(&[dir], &Settings::default()).await.unwrap_err();
    assert!(err.to_string().contains(RESULT_FILE));
}

#[test]
fn test_compare_across_result_sets() {
    let tmp = TempDir::new().unwrap();
    let sets: Vec<PathBuf> = (0..4)
        .map(|i| benchmark(tmp.path(), &format!("20210923-15293{}-run{}", i, i), 100 + i, 150 + i))
        .collect();

    let cmp = compare_across_runs(&sets).unwrap();
    assert_eq!(cmp.groups, vec!["baseline", "instrumented"]);

    let mean = cmp.metrics.iter().find(|m| m.metric == "LatenciesMean").unwrap();
    assert_eq!(mean.summaries[0].unwrap().n, 4);
    let delta = mean.deltas[1].unwrap();
    assert!(delta.change_pct.unwrap() > 45.0);

    let text = cmp.to_text();
    assert!(text.lines().next().unwrap().starts_with("name"));
    assert!(text.contains("LatenciesMean (ms)"));
}
