//! Per-tick telemetry snapshot.

use drivesight_common::TelemetryValue;
use serde::Serialize;

/// A snapshot value: an engineering number or a flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Number(f64),
    Flag(bool),
}

impl From<SnapshotValue> for TelemetryValue {
    fn from(value: SnapshotValue) -> Self {
        match value {
            SnapshotValue::Number(v) => TelemetryValue::Gauge(v),
            SnapshotValue::Flag(on) => TelemetryValue::Boolean(on),
        }
    }
}

/// One entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: SnapshotValue,
    /// Engineering unit, when the value comes from a catalog register.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// 1-based register the value was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<u16>,
}

/// The successfully read values of one poll tick, in read order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Unix epoch milliseconds at the start of the tick.
    pub timestamp: i64,
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::at(chrono::Utc::now().timestamp_millis())
    }

    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            entries: Vec::new(),
        }
    }

    pub fn push_number(&mut self, key: impl Into<String>, value: f64, unit: Option<&str>) {
        self.entries.push(SnapshotEntry {
            key: key.into(),
            value: SnapshotValue::Number(value),
            unit: unit.filter(|u| !u.is_empty() && *u != "-").map(str::to_string),
            address: None,
        });
    }

    /// Push a number read from register `address`.
    pub fn push_register(
        &mut self,
        key: impl Into<String>,
        value: f64,
        unit: Option<&str>,
        address: u16,
    ) {
        self.push_number(key, value, unit);
        if let Some(last) = self.entries.last_mut() {
            last.address = Some(address);
        }
    }

    pub fn push_flag(&mut self, key: impl Into<String>, on: bool) {
        self.entries.push(SnapshotEntry {
            key: key.into(),
            value: SnapshotValue::Flag(on),
            unit: None,
            address: None,
        });
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<SnapshotValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
