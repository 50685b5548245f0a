// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run variants and the per-variant state machine.
//!
//! Each variant of a benchmark moves through:
//!
//! ```text
//! Idle -> Building -> Started -> AwaitingCompletion -> TearingDown -> Completed
//!            |           |                                  |
//!            +-----------+---------> TearingDown            +----> Failed
//! ```
//!
//! `TearingDown` is entered exactly once per variant, whatever happened
//! before it. The terminal state is `Failed` if any earlier step recorded a
//! failure, `Completed` otherwise.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Variant name that never talks to a sidecar.
pub const BASELINE: &str = "baseline";

/// One named configuration of the application under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVariant {
    /// Variant name, also the name of its source directory
    pub name: String,
    /// Whether the run needs the mock ingestion sidecar
    pub requires_sidecar: bool,
}

impl RunVariant {
    /// Create a variant.
    pub fn new(name: impl Into<String>, requires_sidecar: bool) -> Self {
        Self {
            name: name.into(),
            requires_sidecar,
        }
    }

    /// Derive a variant from its directory name; everything but `baseline`
    /// sends telemetry to the sidecar.
    pub fn from_dir_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let requires_sidecar = name != BASELINE;
        Self {
            name,
            requires_sidecar,
        }
    }
}

/// State of one variant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing done yet.
    Idle,
    /// Descriptor materialized, images being built.
    Building,
    /// Environment started; containers are live resources.
    Started,
    /// Waiting for the load generator container to exit.
    AwaitingCompletion,
    /// Containers and local images being removed.
    TearingDown,
    /// Run finished and produced an artifact.
    Completed,
    /// Run failed; the benchmark is aborted.
    Failed,
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

impl RunState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Idle, Building)
                | (Building, Started)
                | (Building, TearingDown)
                | (Started, AwaitingCompletion)
                | (Started, TearingDown)
                | (AwaitingCompletion, TearingDown)
                | (TearingDown, Completed)
                | (TearingDown, Failed)
        )
    }

    /// Whether the run has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// A recorded state change (append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// Previous state
    pub from: RunState,
    /// New state
    pub to: RunState,
    /// When the change happened
    pub at: DateTime<Utc>,
}

/// Bookkeeping for one variant run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Variant being run
    pub variant: String,
    /// Compose project name, unique per benchmark and variant
    pub project_name: String,
    /// Current state
    pub state: RunState,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time (set on reaching a terminal state)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// First failure recorded during the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Every transition taken
    #[serde(default)]
    pub history: Vec<StateChange>,
}

impl RunRecord {
    /// Start tracking a run in the `Idle` state.
    pub fn new(variant: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            project_name: project_name.into(),
            state: RunState::Idle,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            error_message: None,
            history: Vec::new(),
        }
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn transition(&mut self, to: RunState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                variant: self.variant.clone(),
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        self.history.push(StateChange {
            from: self.state,
            to,
            at: now,
        });
        self.state = to;
        if to.is_terminal() {
            self.end_time = Some(now);
            self.duration_ms = Some(
                now.signed_duration_since(self.start_time)
                    .num_milliseconds()
                    .unsigned_abs(),
            );
        }
        Ok(())
    }

    /// Record a failure. Only the first one is kept.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        if self.error_message.is_none() {
            self.error_message = Some(error.into());
        }
    }

    /// Leave `TearingDown` for the terminal state implied by recorded failures.
    pub fn finish(&mut self) -> Result<RunState> {
        let terminal = if self.error_message.is_some() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        self.transition(terminal)?;
        Ok(terminal)
    }

    /// Whether the run completed successfully.
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Whether the run failed.
    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// Number of times the run entered `TearingDown`.
    pub fn teardown_count(&self) -> usize {
        self.history
            .iter()
            .filter(|c| c.to == RunState::TearingDown)
            .count()
    }
}

/// Output of a completed run, handed to the result tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    /// Variant name
    pub variant_name: String,
    /// Directory holding `result.json` and friends
    pub artifact_path: PathBuf,
    /// Compose descriptor the run was started with
    pub compose_descriptor: String,
}
