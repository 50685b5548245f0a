// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Command-line interface for instrumentation overhead benchmarks.
//!
//! - `run PLATFORM...` benchmarks every variant of each platform, then
//!   builds and sanity-checks the report
//! - `report RESULT...` rebuilds the report of existing result sets
//! - `compare RESULT...` compares repeated result sets statistically

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use overhead_bench_core::{BenchmarkConfig, Settings};
use overhead_bench_orchestrator::{layout, DockerCompose, Orchestrator};
use overhead_bench_results::compare::to_bench_format;
use overhead_bench_results::{compare_across_runs, io, report, sanity, Report};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logging::LogFormat;

/// Instrumentation overhead benchmark.
#[derive(Parser, Debug)]
#[command(name = "overhead-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (TOML, JSON or YAML); defaults to `overhead-bench.*` if present.
    #[arg(long, global = true, env = "OVERHEAD_BENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark one or more platforms, e.g. `platform/python/django`.
    ///
    /// A platform directory runs all of its variants; a variant directory
    /// (`platform/python/django/instrumented`) runs only that one.
    Run {
        /// Platform or variant directories.
        #[arg(required = true)]
        platforms: Vec<PathBuf>,
    },

    /// Build `report.json` and `summary.md` for existing result sets.
    Report {
        /// Result set directories, e.g. `result/python/django/20210923-152931-snbclwa`.
        #[arg(required = true)]
        results: Vec<PathBuf>,
    },

    /// Compare repeated result sets with a Mann-Whitney U test.
    Compare {
        /// Result set directories.
        #[arg(required = true)]
        results: Vec<PathBuf>,

        /// Print every run's metrics in Go benchmark format instead.
        #[arg(long)]
        bench_format: bool,
    },
}

/// Execute a parsed command line. `cancel` interrupts a running benchmark.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<ExitCode> {
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Run { platforms } => run_benchmarks(&platforms, &settings, cancel).await,
        Commands::Report { results } => {
            let (report, summary) = report::generate(&results, &settings).await?;
            println!("{}", summary.display());
            Ok(exit_code(sanity_check(&report)))
        }
        Commands::Compare {
            results,
            bench_format,
        } => {
            if bench_format {
                for run in io::discover_runs(&results)? {
                    let tr = io::read_test_result(&run.path.join(io::RESULT_FILE))?;
                    println!("# {}", run.name);
                    print!("{}", to_bench_format(&tr));
                }
            } else {
                print!("{}", compare_across_runs(&results)?.to_text());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_benchmarks(platforms: &[PathBuf], settings: &Settings, cancel: CancellationToken) -> Result<ExitCode> {
    // Every platform is validated before anything runs.
    let configs = platforms
        .iter()
        .map(|p| BenchmarkConfig::from_path(p).with_context(|| format!("configuring {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let orchestrator = Orchestrator::new(DockerCompose::new(&settings.compose_binary), settings)?
        .with_cancellation(cancel.clone());

    let mut ok = true;
    for cfg in &configs {
        if cancel.is_cancelled() {
            bail!("interrupted");
        }
        let artifacts = orchestrator.run_benchmark(cfg).await?;
        info!(id = %cfg.id, runs = artifacts.len(), "benchmark complete");

        let dir = layout::benchmark_dir(&settings.result_root, cfg);
        let (report, summary) = report::generate(&[dir], settings).await?;
        println!("{}", summary.display());
        ok &= sanity_check(&report);
    }
    Ok(exit_code(ok))
}

/// Print every violation; true when there were none.
fn sanity_check(report: &Report) -> bool {
    let checked = sanity::check(&report.named_results(), &sanity::SanityPolicy::default());
    for violation in &checked.violations {
        eprintln!("{} {}", "SANITY".red().bold(), violation);
    }
    if !checked.is_ok() {
        warn!(id = %report.id, violations = checked.len(), "sanity check failed");
    }
    checked.is_ok()
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_commands_require_paths() {
        for cmd in ["run", "report", "compare"] {
            let err = Cli::try_parse_from(["overhead-bench", cmd]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "overhead-bench",
            "--log-format",
            "json",
            "run",
            "platform/python/django",
            "platform/go/go-std/instrumented",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run { platforms } => assert_eq!(platforms.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_compare_bench_format() {
        let cli = Cli::try_parse_from(["overhead-bench", "compare", "--bench-format", "a", "b"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Compare { bench_format: true, ref results } if results.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_bad_platform_fails_before_running() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cli = Cli {
            config: None,
            log_format: LogFormat::Text,
            command: Commands::Run {
                platforms: vec![tmp.path().join("missing")],
            },
        };
        let err = run(cli, CancellationToken::new()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("could not read directory"));
    }
}
