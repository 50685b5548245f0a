// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `result.json` model written by the load generator.
//!
//! Durations are serialized as integer nanoseconds and absent collections
//! may be encoded as `null`; both are accepted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::plot::RawResultEvent;

/// Secondary label of a successful request.
pub const LABEL_OK: &str = "OK";

/// Secondary label of a failed request.
pub const LABEL_ERROR: &str = "ERROR";

/// Serde adapter for [`Duration`] as integer nanoseconds.
pub mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as nanoseconds.
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Deserialize nanoseconds; negative values clamp to zero.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ns = i64::deserialize(d)?;
        Ok(Duration::from_nanos(ns.max(0) as u64))
    }
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Latency distribution of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Sum of all latencies
    #[serde(default, with = "nanos")]
    pub total: Duration,
    /// Mean latency
    #[serde(default, with = "nanos")]
    pub mean: Duration,
    /// 50th percentile
    #[serde(default, rename = "50th", with = "nanos")]
    pub p50: Duration,
    /// 90th percentile
    #[serde(default, rename = "90th", with = "nanos")]
    pub p90: Duration,
    /// 95th percentile
    #[serde(default, rename = "95th", with = "nanos")]
    pub p95: Duration,
    /// 99th percentile
    #[serde(default, rename = "99th", with = "nanos")]
    pub p99: Duration,
    /// Slowest request
    #[serde(default, with = "nanos")]
    pub max: Duration,
    /// Fastest request
    #[serde(default, with = "nanos")]
    pub min: Duration,
}

impl LatencyMetrics {
    /// Named percentiles in display order.
    pub fn named(&self) -> [(&'static str, Duration); 8] {
        [
            ("total", self.total),
            ("mean", self.mean),
            ("p50", self.p50),
            ("p90", self.p90),
            ("p95", self.p95),
            ("p99", self.p99),
            ("max", self.max),
            ("min", self.min),
        ]
    }
}

/// Byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ByteMetrics {
    /// Total bytes
    #[serde(default)]
    pub total: u64,
    /// Mean bytes per request
    #[serde(default)]
    pub mean: f64,
}

/// One request as recorded by the load generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadGenRecord {
    /// Attack name
    #[serde(default)]
    pub attack: String,
    /// Dispatch sequence number, contiguous from 0 per attack
    pub seq: u64,
    /// HTTP status code
    #[serde(default)]
    pub code: u16,
    /// Dispatch time
    pub timestamp: DateTime<Utc>,
    /// Request latency
    #[serde(default, with = "nanos")]
    pub latency: Duration,
    /// Bytes sent
    #[serde(default)]
    pub bytes_out: u64,
    /// Bytes received
    #[serde(default)]
    pub bytes_in: u64,
    /// Error message, empty on success
    #[serde(default)]
    pub error: String,
}

impl LoadGenRecord {
    /// `OK` for successful requests, `ERROR` otherwise.
    pub fn label(&self) -> &'static str {
        if self.error.is_empty() {
            LABEL_OK
        } else {
            LABEL_ERROR
        }
    }

    /// Convert to an aggregator event under the given attack name.
    pub fn to_event(&self, attack: &str) -> RawResultEvent {
        RawResultEvent {
            attack: attack.to_string(),
            seq: self.seq,
            timestamp: self.timestamp,
            latency_ms: self.latency.as_nanos() as f64 / 1e6,
            label: self.label().to_string(),
        }
    }
}

/// A single cAdvisor-style usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Sample time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Peak memory usage
    #[serde(default)]
    pub memory_max_usage_bytes: u64,
    /// Cumulative CPU time in user mode (ns)
    #[serde(default)]
    pub cpu_usage_user: u64,
    /// Cumulative CPU time in kernel mode (ns)
    #[serde(default)]
    pub cpu_usage_system: u64,
    /// Cumulative CPU time (ns)
    #[serde(default)]
    pub cpu_usage_total: u64,
}

/// Signed change between two [`Stats`] snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDifference {
    /// Wall time between snapshots
    #[serde(default, with = "nanos")]
    pub duration: Duration,
    /// Memory delta
    #[serde(default)]
    pub memory_max_usage_bytes: i64,
    /// User CPU delta
    #[serde(default)]
    pub cpu_usage_user: i64,
    /// System CPU delta
    #[serde(default)]
    pub cpu_usage_system: i64,
    /// Total CPU delta
    #[serde(default)]
    pub cpu_usage_total: i64,
}

/// Resource usage of one container across the test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// Snapshot before load started
    #[serde(default)]
    pub before: Stats,
    /// Snapshot after load finished
    #[serde(default)]
    pub after: Stats,
    /// Delta between the snapshots
    #[serde(default)]
    pub difference: StatsDifference,
}

/// SDK identification reported by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
    /// SDK name, e.g. `sentry.python`
    #[serde(default)]
    pub name: String,
    /// SDK version
    #[serde(default)]
    pub version: String,
}

/// Traffic observed by the ingestion sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMetrics {
    /// Requests received
    #[serde(default)]
    pub requests: u64,
    /// First request, raw HTTP
    #[serde(default)]
    pub first_request: String,
    /// SDK seen in the first request
    #[serde(default)]
    pub sdk: SdkInfo,
    /// Total body bytes received
    #[serde(default)]
    pub bytes_received: u64,
}

impl RelayMetrics {
    /// True when the sidecar saw no traffic at all.
    pub fn is_empty(&self) -> bool {
        *self == RelayMetrics::default()
    }
}

/// Load-generation parameters the run used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// URL of the app under test
    #[serde(default)]
    pub target_url: String,
    /// URL of the resource poller
    #[serde(default)]
    pub cadvisor_url: String,
    /// URL of the ingestion sidecar, empty without one
    #[serde(default)]
    pub fakerelay_url: String,
    /// Monitored containers, comma separated
    #[serde(default)]
    pub containers: String,
    /// Readiness wait bound
    #[serde(default, with = "nanos")]
    pub max_wait: Duration,
    /// Warmup duration
    #[serde(default, with = "nanos")]
    pub warmup_duration: Duration,
    /// Test duration
    #[serde(default, with = "nanos")]
    pub test_duration: Duration,
    /// Requests per second
    #[serde(default)]
    pub rps: u64,
    /// Output directory inside the load generator
    #[serde(default)]
    pub out: String,
}

impl Options {
    /// Requests the test phase was configured to send.
    pub fn planned_requests(&self) -> u64 {
        self.test_duration.as_secs() * self.rps
    }
}

/// Aggregate of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Latency distribution
    #[serde(default)]
    pub latencies: LatencyMetrics,
    /// Bytes received from the app
    #[serde(default)]
    pub bytes_in: ByteMetrics,
    /// Bytes sent to the app
    #[serde(default)]
    pub bytes_out: ByteMetrics,
    /// First request dispatch time
    #[serde(default)]
    pub earliest: Option<DateTime<Utc>>,
    /// Last request dispatch time
    #[serde(default)]
    pub latest: Option<DateTime<Utc>>,
    /// Last response time
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Attack duration
    #[serde(default, with = "nanos")]
    pub duration: Duration,
    /// Time waiting for the last response
    #[serde(default, with = "nanos")]
    pub wait: Duration,
    /// Requests sent
    #[serde(default)]
    pub requests: u64,
    /// Requested rate actually achieved (req/s)
    #[serde(default)]
    pub rate: f64,
    /// Successful requests per second
    #[serde(default)]
    pub throughput: f64,
    /// Fraction of successful requests
    #[serde(default)]
    pub success: f64,
    /// Counts per status code
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_codes: BTreeMap<String, u64>,
    /// Distinct request errors
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
    /// Per-request records
    #[serde(default, deserialize_with = "null_as_default")]
    pub loadgen_result: Vec<LoadGenRecord>,
    /// Usage per monitored container
    #[serde(default, deserialize_with = "null_as_default")]
    pub container_stats: BTreeMap<String, ContainerStats>,
    /// Sidecar observations
    #[serde(default, deserialize_with = "null_as_default")]
    pub relay_metrics: RelayMetrics,
    /// Load generator invocation
    #[serde(default)]
    pub loadgen_command: String,
    /// First response of the app, raw HTTP
    #[serde(default, rename = "FirstAppResponse")]
    pub first_app_response: String,
    /// Load parameters
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Options,
}

impl TestResult {
    /// True when the rounded throughput differs from the rounded rate.
    pub fn throughput_diverges(&self) -> bool {
        self.throughput.round() != self.rate.round()
    }

    /// True when the load generator recorded request errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A parsed run together with its name and location.
#[derive(Debug, Clone)]
pub struct NamedResult {
    /// Display name: the variant directory name, or the full path when
    /// several result sets are combined
    pub name: String,
    /// Run directory
    pub path: PathBuf,
    /// Parsed `result.json`
    pub result: TestResult,
}

impl NamedResult {
    /// Variant label of this run.
    pub fn variant(&self) -> &str {
        variant_label(&self.name)
    }
}

/// Last path component of a run name: `baseline` for both `baseline` and
/// `result/python/django/<benchmark>/baseline`.
pub fn variant_label(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == std::path::MAIN_SEPARATOR)
        .next()
        .unwrap_or(name)
}
