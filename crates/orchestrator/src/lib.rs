// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runs the variants of a benchmark in isolated compose environments.
//!
//! - [`layout`] - project names and artifact directories
//! - [`compose`] - the compose descriptor of a run
//! - [`runtime`] - the [`ContainerRuntime`] seam and its `docker compose` implementation
//! - [`orchestrator`] - the sequential run loop with guaranteed teardown

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod compose;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod runtime;

pub use compose::ComposeDescriptor;
pub use error::{OrchestratorError, Result, RuntimeError};
pub use orchestrator::{Orchestrator, VariantRun};
pub use runtime::{ContainerRuntime, DockerCompose};
