// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reading and writing run artifacts.
//!
//! ```text
//! result/<language>/<framework>/<YYYYMMDD-HHMMSS>-<id>/
//!     report.json  summary.md           # written by `report`
//!     <variant>/
//!         docker-compose.yml  docker-compose-up.log
//!         result.json  histogram.hdr  report.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, ResultsError};
use crate::http::format_http;
use crate::markdown;
use crate::report::Report;
use crate::result::TestResult;

/// Load generator result.
pub const RESULT_FILE: &str = "result.json";

/// HDR histogram text export.
pub const HISTOGRAM_FILE: &str = "histogram.hdr";

/// Load generator text summary.
pub const TEXT_REPORT_FILE: &str = "report.txt";

/// Compose descriptor of a run.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Output of `docker compose up`.
pub const COMPOSE_LOG_FILE: &str = "docker-compose-up.log";

/// Chart-ready report data.
pub const REPORT_FILE: &str = "report.json";

/// Markdown summary.
pub const SUMMARY_FILE: &str = "summary.md";

/// A run directory selected for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLocation {
    /// Display name
    pub name: String,
    /// Run directory
    pub path: PathBuf,
}

/// Read and parse a `result.json`, re-indenting the captured HTTP messages.
pub fn read_test_result(path: &Path) -> Result<TestResult> {
    let bytes = fs::read(path).map_err(|e| ResultsError::io(path, e))?;
    let mut tr: TestResult = serde_json::from_slice(&bytes).map_err(|source| ResultsError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tr.first_app_response = format_http(&tr.first_app_response);
    tr.relay_metrics.first_request = format_http(&tr.relay_metrics.first_request);
    Ok(tr)
}

/// Read a run's HDR histogram export.
pub fn read_histogram(run_dir: &Path) -> Result<String> {
    let path = run_dir.join(HISTOGRAM_FILE);
    fs::read_to_string(&path).map_err(|e| ResultsError::io(path, e))
}

fn sorted_sub_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ResultsError::io(dir, e))? {
        let entry = entry.map_err(|e| ResultsError::io(dir, e))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Collect the run directories of one or more result sets.
///
/// With a single result set runs are named after their directory; with
/// several the full path is used so names stay unique.
pub fn discover_runs(result_sets: &[PathBuf]) -> Result<Vec<RunLocation>> {
    let qualify = result_sets.len() > 1;
    let mut runs = Vec::new();
    for set in result_sets {
        for path in sorted_sub_dirs(set)? {
            let name = if qualify {
                path.display().to_string()
            } else {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            };
            runs.push(RunLocation { name, path });
        }
    }
    if runs.is_empty() {
        return Err(ResultsError::NoResults(result_sets.to_vec()));
    }
    Ok(runs)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| ResultsError::io(path, e))
}

/// Write `report.json`.
pub fn write_report_json(report: &Report, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report).map_err(|source| ResultsError::Json {
        path: path.clone(),
        source,
    })?;
    write_file(&path, &json)?;
    Ok(path)
}

/// Write `summary.md`.
pub fn write_summary(report: &Report, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    write_file(&path, &markdown::generate_summary(report))?;
    Ok(path)
}

/// Write all report outputs next to the runs and return the summary path.
pub fn write_all_outputs(report: &Report) -> Result<PathBuf> {
    let dir = report.output_dir();
    fs::create_dir_all(&dir).map_err(|e| ResultsError::io(&dir, e))?;
    let json = write_report_json(report, &dir)?;
    info!(path = %json.display(), "wrote report data");
    let summary = write_summary(report, &dir)?;
    info!(path = %summary.display(), "wrote report summary");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_single_set() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("instrumented")).unwrap();
        fs::create_dir(tmp.path().join("baseline")).unwrap();
        fs::write(tmp.path().join("report.json"), "{}").unwrap();

        let runs = discover_runs(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["baseline", "instrumented"]);
    }

    #[test]
    fn test_discover_multiple_sets_uses_paths() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::create_dir(a.path().join("baseline")).unwrap();
        fs::create_dir(b.path().join("baseline")).unwrap();

        let runs = discover_runs(&[a.path().to_path_buf(), b.path().to_path_buf()]).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, a.path().join("baseline").display().to_string());
        assert_ne!(runs[0].name, runs[1].name);
    }

    #[test]
    fn test_discover_empty_set() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_runs(&[tmp.path().to_path_buf()]),
            Err(ResultsError::NoResults(_))
        ));
    }

    #[test]
    fn test_read_test_result_formats_http() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(RESULT_FILE);
        fs::write(
            &path,
            r#"{"FirstAppResponse": "HTTP/1.1 200 OK\r\n\r\n[{\"id\":1}]", "requests": 3}"#,
        )
        .unwrap();
        let tr = read_test_result(&path).unwrap();
        assert_eq!(tr.requests, 3);
        assert_eq!(tr.first_app_response, "HTTP/1.1 200 OK\r\n\r\n[\n  {\n    \"id\": 1\n  }\n]\n");
    }

    #[test]
    fn test_read_malformed_result() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(RESULT_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_test_result(&path), Err(ResultsError::Json { .. })));
        assert!(matches!(
            read_test_result(&tmp.path().join("missing.json")),
            Err(ResultsError::Io { .. })
        ));
    }
}
