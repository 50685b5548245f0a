// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic names and paths of a run.
//!
//! Every name embeds the benchmark id, so concurrent benchmarks on one host
//! never share a compose project or an artifact directory, and the variant
//! name keeps runs of the same benchmark apart.

use overhead_bench_core::{BenchmarkConfig, RunVariant};
use std::path::{Path, PathBuf};

/// Timestamp format of benchmark directories.
pub const START_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Compose project name: `<language>-<framework>-<variant>-<id>`.
pub fn project_name(cfg: &BenchmarkConfig, variant: &RunVariant) -> String {
    format!("{}-{}-{}-{}", cfg.language(), cfg.framework(), variant.name, cfg.id)
}

/// Benchmark directory name: `<YYYYMMDD-HHMMSS>-<id>`.
pub fn benchmark_dir_name(cfg: &BenchmarkConfig) -> String {
    format!("{}-{}", cfg.start_time.format(START_TIME_FORMAT), cfg.id)
}

/// Directory shared by all runs of the benchmark.
pub fn benchmark_dir(result_root: &Path, cfg: &BenchmarkConfig) -> PathBuf {
    result_root
        .join(cfg.language())
        .join(cfg.framework())
        .join(benchmark_dir_name(cfg))
}

/// Artifact directory of one run:
/// `<root>/<language>/<framework>/<YYYYMMDD-HHMMSS>-<id>/<variant>`.
pub fn artifact_dir(result_root: &Path, cfg: &BenchmarkConfig, variant: &RunVariant) -> PathBuf {
    benchmark_dir(result_root, cfg).join(&variant.name)
}

/// Container name of a service within a project.
pub fn container_name(project: &str, service: &str) -> String {
    format!("{}-{}", project, service)
}
