// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result processing for instrumentation overhead benchmarks.
//!
//! Everything that happens after the load generator has written its
//! artifacts: parsing, time-series aggregation, comparison, sanity checks
//! and report output.
//!
//! # Quick Start
//!
//! ```no_run
//! use overhead_bench_core::Settings;
//! use overhead_bench_results::{report, sanity};
//! use std::path::PathBuf;
//!
//! # async fn demo() -> overhead_bench_results::Result<()> {
//! let settings = Settings::default();
//! let sets = vec![PathBuf::from("result/python/django/20210923-152931-snbclwa")];
//! let (report, summary) = report::generate(&sets, &settings).await?;
//! let checked = sanity::check(&report.named_results(), &sanity::SanityPolicy::default());
//! println!("{} violations, summary at {}", checked.len(), summary.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`result`] - the `result.json` model
//! - [`io`] - artifact layout, reading and writing
//! - [`plot`] - sequence-gated time-series aggregator
//! - [`lttb`] - downsampling
//! - [`compare`] - percent differences and cross-run comparison
//! - [`stats`] - Mann-Whitney U test
//! - [`sanity`] - structural and per-variant checks
//! - [`report`] - report assembly
//! - [`markdown`] - markdown summary
//! - [`http`] - raw HTTP helpers

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod compare;
pub mod error;
pub mod http;
pub mod io;
pub mod lttb;
pub mod markdown;
pub mod plot;
pub mod report;
pub mod result;
pub mod sanity;
pub mod stats;

pub use compare::{compare_across_runs, percent_diff, Comparison, LatencyDiff};
pub use error::{CompareError, PlotError, Result, ResultsError};
pub use plot::{Plot, PlotMatrix, RawResultEvent, Stall, TimeSeries};
pub use report::Report;
pub use result::{NamedResult, TestResult};
pub use sanity::{SanityPolicy, SanityReport, Violation};
