// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for result processing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the time-series aggregator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlotError {
    /// `add` called after `close`
    #[error("plot is closed")]
    Closed,

    /// Sequence number already seen for this attack
    #[error("duplicate sequence number {seq} in attack {attack:?}")]
    DuplicateSequence {
        /// Attack label
        attack: String,
        /// Offending sequence number
        seq: u64,
    },
}

/// Errors raised by the comparison engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompareError {
    /// Baseline value of a percentage difference is zero
    #[error("cannot compute percent difference of {metric}: baseline is zero")]
    ZeroBaseline {
        /// Metric being compared
        metric: String,
    },
}

/// Errors raised while reading artifacts or producing reports.
#[derive(Debug, Error)]
pub enum ResultsError {
    /// Filesystem error
    #[error("{path:?}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON artifact
    #[error("could not parse {path:?}: {source}")]
    Json {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// No run directories under the given result paths
    #[error("no valid results in: {0:?}")]
    NoResults(Vec<PathBuf>),

    /// Aggregation failure
    #[error(transparent)]
    Plot(#[from] PlotError),

    /// Comparison failure
    #[error(transparent)]
    Compare(#[from] CompareError),

    /// Walking a result tree failed
    #[error("walking {root:?}: {message}")]
    Walk {
        /// Root being walked
        root: PathBuf,
        /// Error description
        message: String,
    },

    /// Background task failed
    #[error("result producer task failed: {0}")]
    Task(String),
}

impl ResultsError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResultsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for result processing.
pub type Result<T> = std::result::Result<T, ResultsError>;
