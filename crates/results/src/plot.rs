// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time-series aggregation of per-request results.
//!
//! Requests are dispatched concurrently, so results complete out of order.
//! [`Plot`] buffers each attack's events by sequence number and only flushes
//! a point once every lower sequence number of that attack has been seen,
//! reconstructing dispatch order. Flushed points land in one series per
//! `(attack, label)` pair, which [`Plot::to_matrix`] downsamples and merges
//! into a single chart-ready matrix.
//!
//! A sequence number that never arrives blocks its attack forever. The
//! aggregator does not evict; it reports the blockage through
//! [`Plot::stalls`] and when closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::PlotError;
use crate::lttb::{self, Point};

/// Header of the matrix's first column.
pub const X_LABEL: &str = "Elapsed (ms)";

/// One completed request as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultEvent {
    /// Attack (partition) the request belongs to
    pub attack: String,
    /// Dispatch sequence number, contiguous from 0 per attack
    pub seq: u64,
    /// Dispatch time
    pub timestamp: DateTime<Utc>,
    /// Request latency in milliseconds
    pub latency_ms: f64,
    /// Secondary label, e.g. `OK` or `ERROR`
    pub label: String,
}

/// Ordered samples of one `(attack, label)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Attack label
    pub attack: String,
    /// Secondary label
    pub label: String,
    /// `(elapsed_ms, value)` pairs, non-decreasing in elapsed time
    pub points: Vec<(u64, f64)>,
}

impl TimeSeries {
    fn new(attack: &str, label: &str) -> Self {
        Self {
            attack: attack.to_string(),
            label: label.to_string(),
            points: Vec::new(),
        }
    }

    fn push(&mut self, elapsed_ms: u64, value: f64) {
        let floor = self.points.last().map_or(0, |&(x, _)| x);
        self.points.push((elapsed_ms.max(floor), value));
    }

    /// Column ordering key.
    fn sort_key(&self) -> String {
        format!("{}{}", self.attack, self.label)
    }

    /// Column header.
    pub fn title(&self) -> String {
        format!("{}: {}", self.attack, self.label)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when nothing has been flushed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// An attack whose buffer is waiting on a missing sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stall {
    /// Attack label
    pub attack: String,
    /// Sequence number that never arrived
    pub waiting_for: u64,
    /// Events buffered behind it
    pub pending: usize,
}

#[derive(Debug)]
struct Pending {
    timestamp: DateTime<Utc>,
    latency_ms: f64,
    label: String,
}

#[derive(Debug, Default)]
struct AttackBuffer {
    began: Option<DateTime<Utc>>,
    next_seq: u64,
    pending: HashMap<u64, Pending>,
    series: BTreeMap<String, TimeSeries>,
    stall_reported: bool,
}

impl AttackBuffer {
    fn add(&mut self, attack: &str, event: RawResultEvent, max_pending: Option<usize>) -> Result<(), PlotError> {
        if event.seq < self.next_seq || self.pending.contains_key(&event.seq) {
            return Err(PlotError::DuplicateSequence {
                attack: attack.to_string(),
                seq: event.seq,
            });
        }

        let seq = event.seq;
        self.pending.insert(
            seq,
            Pending {
                timestamp: event.timestamp,
                latency_ms: event.latency_ms,
                label: event.label,
            },
        );

        if seq != self.next_seq {
            self.check_stall(attack, max_pending);
            return Ok(());
        }

        let began = *self.began.get_or_insert(event.timestamp);
        while let Some(point) = self.pending.remove(&self.next_seq) {
            let elapsed = (point.timestamp - began).num_milliseconds().max(0) as u64;
            self.series
                .entry(point.label.clone())
                .or_insert_with(|| TimeSeries::new(attack, &point.label))
                .push(elapsed, point.latency_ms);
            self.next_seq += 1;
        }

        if self.pending.is_empty() {
            self.stall_reported = false;
        }
        Ok(())
    }

    fn check_stall(&mut self, attack: &str, max_pending: Option<usize>) {
        let Some(bound) = max_pending else {
            return;
        };
        if self.pending.len() > bound && !self.stall_reported {
            warn!(
                attack = %attack,
                waiting_for = self.next_seq,
                pending = self.pending.len(),
                "result stream stalled on a missing sequence number"
            );
            self.stall_reported = true;
        }
    }

    fn stall(&self, attack: &str) -> Option<Stall> {
        (!self.pending.is_empty()).then(|| Stall {
            attack: attack.to_string(),
            waiting_for: self.next_seq,
            pending: self.pending.len(),
        })
    }
}

/// Sequence-gated aggregator of result events.
///
/// `add` takes `&mut self`; calls are serialized by construction. Feed it
/// from a single consuming loop, e.g. [`Plot::drain`].
#[derive(Debug, Default)]
pub struct Plot {
    attacks: BTreeMap<String, AttackBuffer>,
    max_pending: Option<usize>,
    closed: bool,
}

impl Plot {
    /// Create an aggregator without a stall bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Warn once per stall when an attack buffers more than `bound` events.
    pub fn with_max_pending(mut self, bound: Option<usize>) -> Self {
        self.max_pending = bound;
        self
    }

    /// Ingest one event, in arrival order.
    pub fn add(&mut self, event: RawResultEvent) -> Result<(), PlotError> {
        if self.closed {
            return Err(PlotError::Closed);
        }
        let attack = event.attack.clone();
        self.attacks
            .entry(attack.clone())
            .or_default()
            .add(&attack, event, self.max_pending)
    }

    /// Attacks currently blocked on a missing sequence number.
    pub fn stalls(&self) -> Vec<Stall> {
        self.attacks
            .iter()
            .filter_map(|(attack, buffer)| buffer.stall(attack))
            .collect()
    }

    /// Finalize; further `add` calls fail. Returns the attacks whose
    /// buffered events could not be flushed.
    pub fn close(&mut self) -> Vec<Stall> {
        self.closed = true;
        let stalls = self.stalls();
        for stall in &stalls {
            warn!(
                attack = %stall.attack,
                waiting_for = stall.waiting_for,
                pending = stall.pending,
                "results dropped: sequence number never arrived"
            );
        }
        stalls
    }

    /// True once [`Plot::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume events until every sender is dropped, then close.
    pub async fn drain(&mut self, mut rx: mpsc::Receiver<RawResultEvent>) -> Result<Vec<Stall>, PlotError> {
        let mut count = 0u64;
        while let Some(event) = rx.recv().await {
            self.add(event)?;
            count += 1;
        }
        debug!(events = count, "result stream closed");
        Ok(self.close())
    }

    /// All series, ordered by `attack + label`.
    pub fn series(&self) -> Vec<&TimeSeries> {
        let mut series: Vec<&TimeSeries> = self
            .attacks
            .values()
            .flat_map(|buffer| buffer.series.values())
            .collect();
        series.sort_by(|a, b| {
            a.sort_key()
                .cmp(&b.sort_key())
                .then_with(|| (&a.attack, &a.label).cmp(&(&b.attack, &b.label)))
        });
        series
    }

    /// Downsample every series to `threshold` points and merge them into
    /// one matrix.
    pub fn to_matrix(&self, threshold: usize) -> PlotMatrix {
        let series = self.series();
        let width = series.len() + 1;

        let mut labels = Vec::with_capacity(width);
        labels.push(X_LABEL.to_string());
        let mut rows = Vec::new();

        for (column, ts) in series.iter().enumerate() {
            labels.push(ts.title());
            let points: Vec<Point> = ts
                .points
                .iter()
                .map(|&(x, y)| Point::new(x as f64, y))
                .collect();
            for point in lttb::downsample(&points, threshold) {
                let mut row = vec![f64::NAN; width];
                row[0] = point.x;
                row[column + 1] = point.y;
                rows.push(row);
            }
        }

        rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
        PlotMatrix { labels, rows }
    }
}

/// Chart-ready merge of all series.
///
/// Each row is `[x, y_1, ..., y_n]` with exactly one populated `y`; the
/// others are NaN (serialized as `null` in JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotMatrix {
    /// Column headers; the first names the x axis
    pub labels: Vec<String>,
    /// Rows sorted by x ascending
    pub rows: Vec<Vec<f64>>,
}

impl PlotMatrix {
    /// Number of series columns.
    pub fn series_count(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    /// Render as a JavaScript array literal, NaN spelled `NaN`.
    pub fn to_js_array(&self) -> String {
        let mut out = String::from("[\n");
        for row in &self.rows {
            out.push_str("  [");
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if value.is_nan() {
                    out.push_str("NaN");
                } else {
                    let _ = write!(out, "{}", value);
                }
            }
            out.push_str("],\n");
        }
        out.push(']');
        out
    }
}
