// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tool settings.
//!
//! Built once at process start from, in increasing priority:
//!
//! 1. built-in defaults
//! 2. `overhead-bench.{toml,json,yaml}` in the working directory (optional),
//!    or an explicit file given on the command line
//! 3. `OVERHEAD_BENCH_*` environment variables (e.g. `OVERHEAD_BENCH_RESULT_ROOT`)
//!
//! The resulting [`Settings`] value is passed by reference to the
//! orchestrator and the report builder.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base name of the optional settings file.
pub const SETTINGS_FILE: &str = "overhead-bench";

/// Prefix of settings environment variables.
pub const ENV_PREFIX: &str = "OVERHEAD_BENCH";

/// Process-wide tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the artifact tree
    pub result_root: PathBuf,
    /// Container tool binary; invoked as `<binary> compose ...`
    pub compose_binary: String,
    /// Build context of the load generator image
    pub loadgen_context: PathBuf,
    /// Build context of the mock ingestion sidecar image
    pub relay_context: PathBuf,
    /// Max points per plotted series
    pub downsample_threshold: usize,
    /// Capacity of the queue between result reader and aggregator
    pub channel_capacity: usize,
    /// Upper bound on waiting for the load generator, e.g. `30m`. Unset waits forever.
    #[serde(default)]
    pub max_wait: Option<String>,
    /// Buffered out-of-order results per attack before a stall is reported
    #[serde(default)]
    pub max_pending_per_attack: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            result_root: PathBuf::from("result"),
            compose_binary: "docker".to_string(),
            loadgen_context: PathBuf::from("tool/loadgen"),
            relay_context: PathBuf::from("tool/fakerelay"),
            downsample_threshold: 4000,
            channel_capacity: 1024,
            max_wait: None,
            max_pending_per_attack: None,
        }
    }
}

impl Settings {
    /// Load settings from defaults, a settings file and the environment.
    ///
    /// An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("result_root", defaults.result_root.to_string_lossy().into_owned())?
            .set_default("compose_binary", defaults.compose_binary.as_str())?
            .set_default(
                "loadgen_context",
                defaults.loadgen_context.to_string_lossy().into_owned(),
            )?
            .set_default(
                "relay_context",
                defaults.relay_context.to_string_lossy().into_owned(),
            )?
            .set_default("downsample_threshold", defaults.downsample_threshold as i64)?
            .set_default("channel_capacity", defaults.channel_capacity as i64)?;

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path.to_path_buf()).required(true)),
            None => builder.add_source(config::File::with_name(SETTINGS_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(CoreError::Settings(
                "channel_capacity must be positive".to_string(),
            ));
        }
        if self.compose_binary.trim().is_empty() {
            return Err(CoreError::Settings("compose_binary is empty".to_string()));
        }
        self.max_wait_duration()?;
        Ok(())
    }

    /// Parsed `max_wait`.
    pub fn max_wait_duration(&self) -> Result<Option<Duration>> {
        self.max_wait
            .as_deref()
            .map(|s| {
                humantime::parse_duration(s)
                    .map_err(|e| CoreError::Settings(format!("invalid max_wait {:?}: {}", s, e)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_wait_duration().unwrap(), None);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bench.toml");
        fs::write(
            &path,
            "downsample_threshold = 250\nmax_wait = \"30m\"\nmax_pending_per_attack = 64\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.downsample_threshold, 250);
        assert_eq!(settings.max_pending_per_attack, Some(64));
        assert_eq!(
            settings.max_wait_duration().unwrap(),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(settings.compose_binary, "docker");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.toml");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(CoreError::Settings(_))
        ));
    }

    #[test]
    fn test_invalid_max_wait_rejected() {
        let settings = Settings {
            max_wait: Some("forever".to_string()),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
