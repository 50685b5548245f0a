// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error type for configuration and run bookkeeping.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a benchmark configuration or tracking runs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Platform path is missing or not a directory
    #[error("could not read directory: {0:?}")]
    NotADirectory(PathBuf),

    /// No `config.json` next to or above the given path
    #[error("no config file found in: {0:?}")]
    ConfigNotFound(Vec<PathBuf>),

    /// Platform configuration failed validation
    #[error("platform config {0}")]
    InvalidPlatformConfig(String),

    /// Platform contains no variant directories
    #[error("no app to benchmark in {0:?}")]
    NoVariants(PathBuf),

    /// Variant directory has no Dockerfile
    #[error("no Dockerfile in {0:?}")]
    NoDockerfile(PathBuf),

    /// Illegal run state transition
    #[error("invalid run state transition for {variant}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Variant name
        variant: String,
        /// State the run was in
        from: crate::run::RunState,
        /// Requested state
        to: crate::run::RunState,
    },

    /// Tool settings could not be loaded
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Filesystem error
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON decoding error
    #[error("could not parse {path:?}: {source}")]
    Json {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Wrap an I/O error with a short description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Settings(err.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
