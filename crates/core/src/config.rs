// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Platform configuration and benchmark discovery.
//!
//! A platform directory looks like:
//!
//! ```text
//! platform/python/django/
//!     config.json       # PlatformConfig
//!     baseline/         # one directory per variant, each with a Dockerfile
//!     instrumented/
//! ```
//!
//! [`BenchmarkConfig::from_path`] accepts either the platform directory (all
//! variants) or a single variant directory.

use crate::error::{CoreError, Result};
use crate::id::BenchmarkId;
use crate::run::RunVariant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Name of the per-platform configuration file.
pub const PLATFORM_CONFIG_FILE: &str = "config.json";

/// Request target of the application under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Path and query requested by the load generator, e.g. `/update?queries=10`.
    #[serde(default, alias = "Path")]
    pub path: String,
}

/// Contents of a platform's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Request target
    #[serde(default, alias = "Target")]
    pub target: Target,
    /// Requested rate in requests per second
    #[serde(default, alias = "RPS")]
    pub rps: u16,
    /// Test duration, e.g. `20s`
    #[serde(default, alias = "Duration")]
    pub duration: String,
}

impl PlatformConfig {
    /// Check that every required field is present and well formed.
    pub fn validate(&self) -> Result<()> {
        if self.target.path.is_empty() {
            return Err(CoreError::InvalidPlatformConfig(
                r#"missing "target.path""#.to_string(),
            ));
        }
        if self.rps == 0 {
            return Err(CoreError::InvalidPlatformConfig(
                r#"missing "rps""#.to_string(),
            ));
        }
        let duration = humantime::parse_duration(&self.duration).map_err(|e| {
            CoreError::InvalidPlatformConfig(format!(
                r#"invalid "duration": {:?}: {}"#,
                self.duration, e
            ))
        })?;
        if duration.is_zero() {
            return Err(CoreError::InvalidPlatformConfig(format!(
                r#"nonpositive "duration": {:?}"#,
                self.duration
            )));
        }
        Ok(())
    }

    /// Parsed test duration. Only meaningful after [`validate`](Self::validate).
    pub fn test_duration(&self) -> Duration {
        humantime::parse_duration(&self.duration).unwrap_or_default()
    }

    /// Read and validate a platform configuration file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::io(format!("reading {}", path.display()), e))?;
        let config: PlatformConfig =
            serde_json::from_str(&content).map_err(|source| CoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

/// Everything needed to run one benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkConfig {
    /// Identifier shared by all runs of this benchmark
    pub id: BenchmarkId,
    /// UTC start time, used in the artifact directory name
    pub start_time: DateTime<Utc>,
    /// Platform directory, e.g. `platform/python/django`
    pub platform: PathBuf,
    /// Parsed platform configuration
    pub platform_config: PlatformConfig,
    /// Variants to run, in order
    pub runs: Vec<RunVariant>,
}

impl BenchmarkConfig {
    /// Build the configuration for the app or apps at `path`.
    ///
    /// `path` is either a platform directory holding `config.json` and one
    /// or more variant directories, or a variant directory whose parent holds
    /// `config.json`. Equivalent spellings of the same path yield equivalent
    /// configuration.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = clean_path(path.as_ref());
        if !path.is_dir() {
            return Err(CoreError::NotADirectory(path));
        }

        let config_path = find_platform_config(&path)?;
        let platform = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let platform_config = PlatformConfig::read(&config_path)?;

        let apps = if platform == path {
            sub_dirs(&path)?
        } else {
            vec![path.clone()]
        };
        if apps.is_empty() {
            return Err(CoreError::NoVariants(path));
        }

        let runs: Vec<RunVariant> = apps
            .iter()
            .filter_map(|app| app.file_name())
            .map(|name| RunVariant::from_dir_name(name.to_string_lossy()))
            .collect();
        debug!(platform = %platform.display(), variants = runs.len(), "benchmark configured");

        Ok(Self {
            id: BenchmarkId::new(),
            start_time: Utc::now(),
            platform,
            platform_config,
            runs,
        })
    }

    /// Language segment of the platform path (`python` in `platform/python/django`).
    pub fn language(&self) -> String {
        self.platform
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Framework segment of the platform path (`django` in `platform/python/django`).
    pub fn framework(&self) -> String {
        self.platform
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory holding the sources of one variant.
    pub fn variant_dir(&self, variant: &RunVariant) -> PathBuf {
        self.platform.join(&variant.name)
    }
}

/// Return the path of the platform configuration for `path`.
///
/// The file must live in `path` itself or in its parent directory.
pub fn find_platform_config(path: &Path) -> Result<PathBuf> {
    let mut candidates = vec![path.join(PLATFORM_CONFIG_FILE)];
    if let Some(parent) = path.parent() {
        candidates.push(parent.join(PLATFORM_CONFIG_FILE));
    }
    let found = candidates.iter().find(|p| p.is_file()).cloned();
    found.ok_or(CoreError::ConfigNotFound(candidates))
}

/// Return the name of the Dockerfile in `dir`.
///
/// Any regular file whose lowercase name contains `dockerfile` qualifies
/// (`Dockerfile`, `django-postgresql.dockerfile`, ...). Entries are scanned in
/// name order.
pub fn find_dockerfile(dir: &Path) -> Result<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| CoreError::io(format!("reading {}", dir.display()), e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
        .into_iter()
        .find(|name| name.to_lowercase().contains("dockerfile"))
        .ok_or_else(|| CoreError::NoDockerfile(dir.to_path_buf()))
}

/// Subdirectories of `path`, sorted by name.
fn sub_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(path)
        .map_err(|e| CoreError::io(format!("reading {}", path.display()), e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Lexically normalize a path: drop `.` segments and trailing separators.
fn clean_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}
