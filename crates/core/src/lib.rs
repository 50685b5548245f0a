// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types for instrumentation overhead benchmarks.
//!
//! A benchmark targets one web application (a *platform*, e.g.
//! `platform/python/django`) and runs one or more *variants* of it
//! (`baseline`, `instrumented`, `opentelemetry`, ...) in isolated
//! environments. This crate holds the pieces shared by the orchestrator,
//! the result tooling and the CLI:
//!
//! - [`id`] - the random [`BenchmarkId`] embedded in every artifact path
//! - [`config`] - platform configuration and [`BenchmarkConfig`] discovery
//! - [`settings`] - process-wide tool [`Settings`], built once at startup
//! - [`run`] - run variants, the per-variant state machine and artifacts
//! - [`error`] - the crate error type

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod id;
pub mod run;
pub mod settings;

pub use config::{BenchmarkConfig, PlatformConfig};
pub use error::{CoreError, Result};
pub use id::BenchmarkId;
pub use run::{RunArtifact, RunRecord, RunState, RunVariant};
pub use settings::Settings;
