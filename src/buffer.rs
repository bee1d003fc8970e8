//! Bounded history buffers
//!
//! Telemetry rows and console lines are kept in size-bounded, order-preserving
//! buffers. Pushing past the cap evicts the oldest entry in O(1); producers
//! never block. The telemetry buffer also offers a recent-time-window view
//! that is recomputed on every read.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Default cap for the telemetry row buffer
pub const DEFAULT_TELEMETRY_MAX_ROWS: usize = 900;

/// Default cap for the console log
pub const DEFAULT_CONSOLE_MAX_LINES: usize = 2000;

/// Fields tried, in order, when deriving a row timestamp
pub const TIMESTAMP_FIELDS: [&str; 4] = ["ts", "time", "t", "timestamp"];

/// Timestamps below this are seconds, at or above it milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

/// FIFO buffer that never grows past its cap
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> BoundedBuffer<T> {
    /// A cap of zero is treated as one.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap.min(4096)),
            cap,
        }
    }

    /// Append an item, returning the evicted oldest item if the cap was hit
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.cap {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Oldest first
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// One line of the serial console
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleLine {
    pub timestamp_ms: u64,
    pub text: String,
}

/// One telemetry record with its derived timestamp (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRow {
    pub timestamp: Option<f64>,
    pub fields: Map<String, Value>,
}

impl TelemetryRow {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            timestamp: derive_timestamp_ms(&fields),
            fields,
        }
    }
}

/// Derive a millisecond timestamp from the first usable timestamp field.
///
/// Numbers and numeric strings are accepted. Values below 1e12 are taken as
/// seconds and converted.
pub fn derive_timestamp_ms(fields: &Map<String, Value>) -> Option<f64> {
    TIMESTAMP_FIELDS.iter().find_map(|key| {
        let raw = match fields.get(*key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !raw.is_finite() {
            return None;
        }
        Some(if raw < MILLIS_THRESHOLD { raw * 1000.0 } else { raw })
    })
}

/// Bounded telemetry history with a time-window view for charting
#[derive(Debug, Clone)]
pub struct TelemetryBuffer {
    rows: BoundedBuffer<TelemetryRow>,
}

impl TelemetryBuffer {
    pub fn new(max_rows: usize) -> Self {
        Self {
            rows: BoundedBuffer::new(max_rows),
        }
    }

    pub fn push(&mut self, row: TelemetryRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &BoundedBuffer<TelemetryRow> {
        &self.rows
    }

    pub fn latest(&self) -> Option<&TelemetryRow> {
        self.rows.latest()
    }

    /// Rows within `window_secs` of the newest timestamped row, oldest first.
    ///
    /// Rows without a timestamp are skipped. Equal timestamps keep insertion
    /// order.
    pub fn window(&self, window_secs: f64) -> Vec<&TelemetryRow> {
        let Some(max_ts) = self
            .rows
            .iter()
            .filter_map(|r| r.timestamp)
            .reduce(f64::max)
        else {
            return Vec::new();
        };
        let cutoff = max_ts - window_secs * 1000.0;

        let mut view: Vec<&TelemetryRow> = self
            .rows
            .iter()
            .filter(|r| r.timestamp.is_some_and(|ts| ts >= cutoff))
            .collect();
        view.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal));
        view
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_MAX_ROWS)
    }
}
