// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the orchestrator.

use overhead_bench_core::CoreError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The command could not be spawned
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The command exited unsuccessfully
    #[error("`{command}` failed: {status}")]
    Exit {
        /// Command line
        command: String,
        /// Exit status description
        status: String,
    },

    /// I/O around the command failed
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// `wait` without a matching `start`
    #[error("no running environment for project {0}")]
    NotStarted(String),
}

/// Errors raised while running a benchmark.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration or state machine error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A runtime step failed
    #[error("variant {variant}: {source}")]
    Runtime {
        /// Variant name
        variant: String,
        /// Underlying error
        #[source]
        source: RuntimeError,
    },

    /// Descriptor could not be serialized
    #[error("rendering compose descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    /// Artifact directory could not be prepared
    #[error("{path:?}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Interrupted by a cancellation signal
    #[error("variant {variant}: cancelled")]
    Cancelled {
        /// Variant name
        variant: String,
    },

    /// Load generator did not finish within the configured bound
    #[error("variant {variant}: load generator still running after {waited:?}")]
    WaitTimeout {
        /// Variant name
        variant: String,
        /// Configured bound
        waited: Duration,
    },
}

impl OrchestratorError {
    /// True when the error stems from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled { .. })
    }
}

/// Result type for orchestration.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
