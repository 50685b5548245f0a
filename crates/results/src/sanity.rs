// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sanity checks over completed runs.
//!
//! Every check runs on every result and every failure is recorded; a
//! non-empty [`SanityReport`] marks the benchmark as failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::http;
use crate::result::{NamedResult, TestResult};

/// Prefix of the first request an instrumented app sends to the relay.
pub const ENVELOPE_PREFIX: &str = "POST /api/1/envelope";

/// Prefix of the first request an OpenTelemetry exporter sends to the relay.
pub const SPANS_PREFIX: &str = "POST /api/v2/spans";

const MAX_QUOTED: usize = 200;

/// Thresholds applied by [`check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityPolicy {
    /// Items the target app must return
    pub expected_items: usize,
    /// Reject payloads where an item repeats the first one
    pub reject_repeated_items: bool,
    /// Minimum spans in an instrumented envelope
    pub min_envelope_spans: usize,
    /// Minimum CLIENT spans in the first OpenTelemetry trace
    pub min_client_spans: usize,
    /// Minimum SERVER spans in the first OpenTelemetry trace
    pub min_server_spans: usize,
}

impl Default for SanityPolicy {
    fn default() -> Self {
        Self {
            expected_items: 10,
            reject_repeated_items: true,
            min_envelope_spans: 20,
            min_client_spans: 20,
            min_server_spans: 1,
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Nothing to check
    #[error("no results")]
    NoResults,

    /// Variant name has no known checks
    #[error("unexpected variant name")]
    UnknownVariant,

    /// Captured message lacks a header/body separator
    #[error("invalid HTTP {what}: {raw:?}")]
    InvalidHttp {
        /// `response` or `request`
        what: String,
        /// Start of the captured message
        raw: String,
    },

    /// Body could not be decoded
    #[error("invalid {what} payload: {reason}")]
    InvalidPayload {
        /// Which payload
        what: String,
        /// Decoder error
        reason: String,
    },

    /// Wrong number of items from the target app
    #[error("first app response returned {got} items, want {want}")]
    WrongItemCount {
        /// Items returned
        got: usize,
        /// Items expected
        want: usize,
    },

    /// An item repeats the first one
    #[error("repeated payload item {index}: {{id: {id}, random_number: {random_number}}}")]
    RepeatedItem {
        /// Index of the repeat
        index: usize,
        /// Item id
        id: i64,
        /// Item value
        random_number: i64,
    },

    /// Load generator saw request errors
    #[error("load generator observed {count} errors")]
    LoadGenErrors {
        /// Distinct errors
        count: usize,
    },

    /// Throughput does not match the requested rate
    #[error("unexpected throughput: {throughput:.2} req/s at rate {rate:.2} req/s")]
    ThroughputMismatch {
        /// Achieved rate
        rate: f64,
        /// Successful requests per second
        throughput: f64,
    },

    /// Relay saw traffic in a run that should send none
    #[error("unexpected relay metrics: {requests} requests, {bytes} bytes")]
    UnexpectedRelayTraffic {
        /// Requests seen
        requests: u64,
        /// Bytes seen
        bytes: u64,
    },

    /// Relay saw no bytes
    #[error("relay got 0 bytes, want >0")]
    NoRelayBytes,

    /// Relay saw fewer requests than the test sent
    #[error("relay got {got} requests, want >={want}")]
    TooFewRelayRequests {
        /// Requests seen by the relay
        got: u64,
        /// Requests sent by the load generator
        want: u64,
    },

    /// First relay request is not the expected endpoint
    #[error("bad first relay request, want prefix {expected:?}")]
    BadFirstRequest {
        /// Expected request line prefix
        expected: String,
    },

    /// Envelope has too few spans
    #[error("too few spans ({got}, want >={want}), missing database instrumentation?")]
    TooFewSpans {
        /// Spans found
        got: usize,
        /// Spans required
        want: usize,
    },

    /// Span export was an empty array
    #[error("missing spans")]
    MissingSpans,

    /// Too few CLIENT spans in the first trace
    #[error("too few CLIENT spans ({got}, want >={want}), missing database instrumentation?")]
    TooFewClientSpans {
        /// Spans found
        got: usize,
        /// Spans required
        want: usize,
    },

    /// Too few SERVER spans in the first trace
    #[error("too few SERVER spans ({got}, want >={want}), missing request handler instrumentation?")]
    TooFewServerSpans {
        /// Spans found
        got: usize,
        /// Spans required
        want: usize,
    },
}

/// A failed check, attributed to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Run name
    pub run: String,
    /// Failure
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.run.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.run, self.kind)
        }
    }
}

/// All violations found by one [`check`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanityReport {
    /// Violations in discovery order
    pub violations: Vec<Violation>,
}

impl SanityReport {
    /// True when no check failed.
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// True when no check failed.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every result and collect all violations.
pub fn check(results: &[NamedResult], policy: &SanityPolicy) -> SanityReport {
    let mut report = SanityReport::default();
    if results.is_empty() {
        report.violations.push(Violation {
            run: String::new(),
            kind: ViolationKind::NoResults,
        });
        return report;
    }

    for named in results {
        info!(run = %named.name, "sanity check");
        let kinds = check_one(named.variant(), &named.result, policy);
        if kinds.is_empty() {
            info!(run = %named.name, "sanity check ok");
        }
        report.violations.extend(kinds.into_iter().map(|kind| Violation {
            run: named.name.clone(),
            kind,
        }));
    }
    report
}

/// Violations of a single result checked as `variant`.
pub fn check_one(variant: &str, tr: &TestResult, policy: &SanityPolicy) -> Vec<ViolationKind> {
    let mut out = Vec::new();
    check_target_app(tr, policy, &mut out);
    check_load_generator(tr, &mut out);
    match variant {
        "baseline" => check_relay_baseline(tr, &mut out),
        "instrumented" => check_relay_instrumented(tr, policy, &mut out),
        "opentelemetry" => check_relay_opentelemetry(tr, policy, &mut out),
        _ => out.push(ViolationKind::UnknownVariant),
    }
    out
}

fn quoted(raw: &str) -> String {
    raw.chars().take(MAX_QUOTED).collect()
}

fn first_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, String> {
    match serde_json::Deserializer::from_str(body).into_iter::<T>().next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("empty body".to_string()),
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct Item {
    #[serde(default, alias = "ID", alias = "Id")]
    id: i64,
    #[serde(default, rename = "randomNumber", alias = "RandomNumber", alias = "randomnumber")]
    random_number: i64,
}

fn check_target_app(tr: &TestResult, policy: &SanityPolicy, out: &mut Vec<ViolationKind>) {
    let Some((_, body)) = http::split_message(&tr.first_app_response) else {
        out.push(ViolationKind::InvalidHttp {
            what: "response".into(),
            raw: quoted(&tr.first_app_response),
        });
        return;
    };

    let items: Vec<Item> = match first_json(body) {
        Ok(items) => items,
        Err(reason) => {
            out.push(ViolationKind::InvalidPayload {
                what: "app response".into(),
                reason,
            });
            return;
        }
    };

    if items.len() != policy.expected_items {
        out.push(ViolationKind::WrongItemCount {
            got: items.len(),
            want: policy.expected_items,
        });
    }

    if policy.reject_repeated_items {
        if let Some((first, rest)) = items.split_first() {
            if let Some((index, item)) = rest.iter().enumerate().find(|(_, item)| *item == first) {
                out.push(ViolationKind::RepeatedItem {
                    index: index + 1,
                    id: item.id,
                    random_number: item.random_number,
                });
            }
        }
    }
}

fn check_load_generator(tr: &TestResult, out: &mut Vec<ViolationKind>) {
    if tr.throughput_diverges() {
        out.push(ViolationKind::ThroughputMismatch {
            rate: tr.rate,
            throughput: tr.throughput,
        });
    }
    if tr.has_errors() {
        out.push(ViolationKind::LoadGenErrors { count: tr.errors.len() });
    }
}

fn check_relay_baseline(tr: &TestResult, out: &mut Vec<ViolationKind>) {
    let m = &tr.relay_metrics;
    if !m.is_empty() {
        out.push(ViolationKind::UnexpectedRelayTraffic {
            requests: m.requests,
            bytes: m.bytes_received,
        });
    }
}

/// Body of the relay's first request, if it starts with `prefix`.
fn relay_body<'a>(tr: &'a TestResult, prefix: &str, out: &mut Vec<ViolationKind>) -> Option<&'a str> {
    let m = &tr.relay_metrics;
    if m.bytes_received == 0 {
        out.push(ViolationKind::NoRelayBytes);
    }
    if !m.first_request.starts_with(prefix) {
        out.push(ViolationKind::BadFirstRequest {
            expected: prefix.to_string(),
        });
        return None;
    }
    match http::split_message(&m.first_request) {
        Some((_, body)) => Some(body),
        None => {
            out.push(ViolationKind::InvalidHttp {
                what: "request".into(),
                raw: quoted(&m.first_request),
            });
            None
        }
    }
}

fn check_relay_instrumented(tr: &TestResult, policy: &SanityPolicy, out: &mut Vec<ViolationKind>) {
    let m = &tr.relay_metrics;
    // The relay also receives readiness and warmup traffic.
    if m.requests < tr.requests {
        out.push(ViolationKind::TooFewRelayRequests {
            got: m.requests,
            want: tr.requests,
        });
    }

    let Some(body) = relay_body(tr, ENVELOPE_PREFIX, out) else {
        return;
    };

    match envelope_spans(body) {
        Ok((transaction, ops)) => {
            info!(
                transaction = transaction.as_deref().unwrap_or("-"),
                spans = ops.len(),
                ops = %ops.join(", "),
                "envelope"
            );
            if ops.len() < policy.min_envelope_spans {
                out.push(ViolationKind::TooFewSpans {
                    got: ops.len(),
                    want: policy.min_envelope_spans,
                });
            }
        }
        Err(reason) => out.push(ViolationKind::InvalidPayload {
            what: "envelope".into(),
            reason,
        }),
    }
}

/// Transaction name and span ops of the first item carrying spans.
fn envelope_spans(body: &str) -> Result<(Option<String>, Vec<String>), String> {
    let mut last_error = None;
    for value in serde_json::Deserializer::from_str(body).into_iter::<serde_json::Value>() {
        let value = match value {
            Ok(value) => value,
            Err(e) => {
                last_error = Some(e.to_string());
                break;
            }
        };
        let Some(spans) = value.get("spans").and_then(|s| s.as_array()) else {
            continue;
        };
        let transaction = value
            .get("transaction")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let ops = spans
            .iter()
            .map(|s| s.get("op").and_then(|o| o.as_str()).unwrap_or("").to_string())
            .collect();
        return Ok((transaction, ops));
    }
    Err(last_error.unwrap_or_else(|| "no item with spans".to_string()))
}

#[derive(Debug, Deserialize)]
struct OtelSpan {
    #[serde(rename = "traceId", default)]
    trace_id: String,
    #[serde(default)]
    kind: String,
}

fn check_relay_opentelemetry(tr: &TestResult, policy: &SanityPolicy, out: &mut Vec<ViolationKind>) {
    let Some(body) = relay_body(tr, SPANS_PREFIX, out) else {
        return;
    };

    let spans: Vec<OtelSpan> = match first_json(body) {
        Ok(spans) => spans,
        Err(reason) => {
            out.push(ViolationKind::InvalidPayload {
                what: "span export".into(),
                reason,
            });
            return;
        }
    };
    let Some(first) = spans.first() else {
        out.push(ViolationKind::MissingSpans);
        return;
    };

    let (mut client, mut server, mut other) = (0, 0, 0);
    let mut kinds = Vec::new();
    for span in spans.iter().filter(|s| s.trace_id == first.trace_id) {
        kinds.push(span.kind.as_str());
        match span.kind.to_lowercase().as_str() {
            "client" => client += 1,
            "server" => server += 1,
            _ => other += 1,
        }
    }
    info!(spans = kinds.len(), kinds = %kinds.join(", "), "span export");

    if client < policy.min_client_spans {
        out.push(ViolationKind::TooFewClientSpans {
            got: client,
            want: policy.min_client_spans,
        });
    }
    if server < policy.min_server_spans {
        out.push(ViolationKind::TooFewServerSpans {
            got: server,
            want: policy.min_server_spans,
        });
    }
    if other > 0 {
        warn!(count = other, "spans that are neither SERVER nor CLIENT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::RelayMetrics;
    use serde_json::json;
    use std::path::PathBuf;

    fn app_response(n: usize) -> String {
        let items: Vec<_> = (0..n).map(|i| json!({"id": i + 1, "randomNumber": 100 + i})).collect();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{}",
            serde_json::to_string_pretty(&items).unwrap()
        )
    }

    fn healthy() -> TestResult {
        TestResult {
            first_app_response: app_response(10),
            requests: 1000,
            rate: 100.0,
            throughput: 99.9,
            ..Default::default()
        }
    }

    fn envelope(spans: usize) -> String {
        let header = json!({"event_id": "9ec79c33ec9942ab8353589fcb2e04dc"});
        let item = json!({"type": "transaction"});
        let spans: Vec<_> = (0..spans).map(|i| json!({"op": "db", "span_id": i})).collect();
        let payload = json!({"transaction": "/update", "spans": spans});
        format!("POST /api/1/envelope/ HTTP/1.1\r\nHost: relay\r\n\r\n{}\n{}\n{}", header, item, payload)
    }

    fn otel(client: usize, server: usize) -> String {
        let mut spans = Vec::new();
        for _ in 0..server {
            spans.push(json!({"traceId": "t1", "kind": "SERVER"}));
        }
        for _ in 0..client {
            spans.push(json!({"traceId": "t1", "kind": "CLIENT"}));
        }
        spans.push(json!({"traceId": "t2", "kind": "CLIENT"}));
        format!("POST /api/v2/spans HTTP/1.1\r\n\r\n{}", json!(spans))
    }

    fn named(name: &str, result: TestResult) -> NamedResult {
        NamedResult {
            name: name.to_string(),
            path: PathBuf::from(name),
            result,
        }
    }

    #[test]
    fn test_healthy_baseline() {
        let report = check(&[named("baseline", healthy())], &SanityPolicy::default());
        assert!(report.is_ok(), "{:?}", report);
    }

    #[test]
    fn test_empty_input() {
        let report = check(&[], &SanityPolicy::default());
        assert_eq!(report.violations[0].kind, ViolationKind::NoResults);
    }

    #[test]
    fn test_accumulates_independent_violations() {
        let mut tr = healthy();
        tr.first_app_response = app_response(9);
        tr.errors = vec!["connection refused".into()];
        tr.relay_metrics.bytes_received = 512;

        let report = check(&[named("baseline", tr)], &SanityPolicy::default());
        let kinds: Vec<_> = report.violations.iter().map(|v| v.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::WrongItemCount { got: 9, want: 10 },
                ViolationKind::LoadGenErrors { count: 1 },
                ViolationKind::UnexpectedRelayTraffic { requests: 0, bytes: 512 },
            ]
        );
        assert!(report.violations.iter().all(|v| v.run == "baseline"));
    }

    #[test]
    fn test_checks_every_result() {
        let mut bad = healthy();
        bad.throughput = 50.0;
        let report = check(
            &[named("baseline", bad), named("mystery", healthy())],
            &SanityPolicy::default(),
        );
        assert_eq!(report.len(), 2);
        assert!(matches!(report.violations[0].kind, ViolationKind::ThroughputMismatch { .. }));
        assert_eq!(report.violations[1].kind, ViolationKind::UnknownVariant);
        assert_eq!(report.violations[1].to_string(), "mystery: unexpected variant name");
    }

    #[test]
    fn test_invalid_app_response() {
        let mut tr = healthy();
        tr.first_app_response = "HTTP/1.1 500".into();
        let kinds = check_one("baseline", &tr, &SanityPolicy::default());
        assert!(matches!(kinds[0], ViolationKind::InvalidHttp { .. }));

        tr.first_app_response = "HTTP/1.1 500\r\n\r\n<html>".into();
        let kinds = check_one("baseline", &tr, &SanityPolicy::default());
        assert!(matches!(kinds[0], ViolationKind::InvalidPayload { .. }));
    }

    #[test]
    fn test_missing_item_fields_default_to_zero() {
        let mut tr = healthy();
        let items: Vec<_> = (1..=10).map(|i| json!({"id": i})).collect();
        tr.first_app_response = format!("HTTP/1.1 200 OK\r\n\r\n{}", json!(items));
        assert!(check_one("baseline", &tr, &SanityPolicy::default()).is_empty());

        let empty: Vec<_> = (0..10).map(|_| json!({})).collect();
        tr.first_app_response = format!("HTTP/1.1 200 OK\r\n\r\n{}", json!(empty));
        assert_eq!(
            check_one("baseline", &tr, &SanityPolicy::default()),
            vec![ViolationKind::RepeatedItem { index: 1, id: 0, random_number: 0 }]
        );
    }

    #[test]
    fn test_repeated_item_policy() {
        let mut tr = healthy();
        let items: Vec<_> = (0..10).map(|_| json!({"id": 7, "randomNumber": 7})).collect();
        tr.first_app_response = format!("HTTP/1.1 200 OK\r\n\r\n{}", json!(items));

        let strict = check_one("baseline", &tr, &SanityPolicy::default());
        assert_eq!(
            strict,
            vec![ViolationKind::RepeatedItem { index: 1, id: 7, random_number: 7 }]
        );

        let lenient = SanityPolicy {
            reject_repeated_items: false,
            ..Default::default()
        };
        assert!(check_one("baseline", &tr, &lenient).is_empty());
    }

    #[test]
    fn test_instrumented_ok() {
        let mut tr = healthy();
        tr.relay_metrics = RelayMetrics {
            requests: 1005,
            bytes_received: 4096,
            first_request: envelope(24),
            ..Default::default()
        };
        assert!(check_one("instrumented", &tr, &SanityPolicy::default()).is_empty());
    }

    #[test]
    fn test_instrumented_failures() {
        let mut tr = healthy();
        tr.relay_metrics = RelayMetrics {
            requests: 10,
            bytes_received: 0,
            first_request: envelope(3),
            ..Default::default()
        };
        let kinds = check_one("instrumented", &tr, &SanityPolicy::default());
        assert_eq!(
            kinds,
            vec![
                ViolationKind::TooFewRelayRequests { got: 10, want: 1000 },
                ViolationKind::NoRelayBytes,
                ViolationKind::TooFewSpans { got: 3, want: 20 },
            ]
        );
    }

    #[test]
    fn test_instrumented_wrong_endpoint() {
        let mut tr = healthy();
        tr.relay_metrics = RelayMetrics {
            requests: 1000,
            bytes_received: 10,
            first_request: "GET /health HTTP/1.1\r\n\r\n".into(),
            ..Default::default()
        };
        let kinds = check_one("instrumented", &tr, &SanityPolicy::default());
        assert_eq!(
            kinds,
            vec![ViolationKind::BadFirstRequest {
                expected: ENVELOPE_PREFIX.into()
            }]
        );
    }

    #[test]
    fn test_opentelemetry_span_counts() {
        let mut tr = healthy();
        tr.relay_metrics = RelayMetrics {
            requests: 1,
            bytes_received: 2048,
            first_request: otel(20, 1),
            ..Default::default()
        };
        assert!(check_one("opentelemetry", &tr, &SanityPolicy::default()).is_empty());

        tr.relay_metrics.first_request = otel(19, 0);
        let kinds = check_one("opentelemetry", &tr, &SanityPolicy::default());
        assert_eq!(
            kinds,
            vec![
                ViolationKind::TooFewClientSpans { got: 19, want: 20 },
                ViolationKind::TooFewServerSpans { got: 0, want: 1 },
            ]
        );
    }

    #[test]
    fn test_opentelemetry_empty_export() {
        let mut tr = healthy();
        tr.relay_metrics = RelayMetrics {
            bytes_received: 2,
            first_request: "POST /api/v2/spans HTTP/1.1\r\n\r\n[]".into(),
            ..Default::default()
        };
        let kinds = check_one("opentelemetry", &tr, &SanityPolicy::default());
        assert_eq!(kinds, vec![ViolationKind::MissingSpans]);
    }
}
