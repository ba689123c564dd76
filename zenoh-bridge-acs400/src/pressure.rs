//! 4-20 mA pressure sensor conversion.
//!
//! The sensor is wired to analog input AI2, which the drive reports as a
//! percentage of the 0-20 mA range. 4 mA (20 %) is 0 bar and 20 mA (100 %) is
//! full scale. The PID internal setpoint uses the same percentage scale, so
//! the inverse map turns a pressure reference into a setpoint value.

use serde::{Deserialize, Serialize};

/// Sensor full-scale pressure in bar.
pub const SENSOR_PRESSURE_MAX: f64 = 10.0;
/// Sensor signal at 0 bar, in % of the analog input range.
pub const SENSOR_SIGNAL_MIN: f64 = 20.0;
/// Sensor signal at full scale, in % of the analog input range.
pub const SENSOR_SIGNAL_MAX: f64 = 100.0;
/// Lowest pressure reference accepted for writes, in bar.
pub const P_REF_MIN: f64 = 0.0;
/// Highest pressure reference accepted for writes, in bar.
pub const P_REF_MAX: f64 = 4.0;

/// A `(group, index)` reference into the register catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRef {
    pub group: u16,
    pub index: u16,
}

impl RegisterRef {
    pub const fn new(group: u16, index: u16) -> Self {
        Self { group, index }
    }
}

/// Linear map between sensor signal and pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureMap {
    /// Sensor full-scale pressure [bar].
    pub sensor_max_bar: f64,
    /// Signal at 0 bar [%].
    pub signal_min_pct: f64,
    /// Signal at full scale [%].
    pub signal_max_pct: f64,
    /// Accepted reference range for writes [bar].
    pub ref_min_bar: f64,
    pub ref_max_bar: f64,
    /// Analog input carrying the sensor signal (default 0119, AI2).
    pub input: RegisterRef,
    /// Register receiving pressure references (default 4020, internal setpoint).
    pub setpoint: RegisterRef,
}

impl Default for PressureMap {
    fn default() -> Self {
        Self {
            sensor_max_bar: SENSOR_PRESSURE_MAX,
            signal_min_pct: SENSOR_SIGNAL_MIN,
            signal_max_pct: SENSOR_SIGNAL_MAX,
            ref_min_bar: P_REF_MIN,
            ref_max_bar: P_REF_MAX,
            input: RegisterRef::new(1, 19),
            setpoint: RegisterRef::new(40, 20),
        }
    }
}

impl PressureMap {
    /// Signal [%] to pressure [bar].
    pub fn to_pressure(&self, signal_pct: f64) -> f64 {
        let k = self.sensor_max_bar / (self.signal_max_pct - self.signal_min_pct);
        (signal_pct - self.signal_min_pct) * k
    }

    /// Pressure [bar] to signal [%].
    pub fn to_signal(&self, bar: f64) -> f64 {
        let k = (self.signal_max_pct - self.signal_min_pct) / self.sensor_max_bar;
        bar * k + self.signal_min_pct
    }

    /// Whether a pressure reference may be written.
    pub fn accepts(&self, bar: f64) -> bool {
        (self.ref_min_bar..=self.ref_max_bar).contains(&bar)
    }

    /// Check the map itself; returns a description of the first problem.
    pub fn check(&self) -> Result<(), String> {
        if !(self.sensor_max_bar > 0.0) {
            return Err(format!(
                "sensor_max_bar must be positive, got {}",
                self.sensor_max_bar
            ));
        }
        if !(self.signal_min_pct < self.signal_max_pct) {
            return Err(format!(
                "signal_min_pct ({}) must be below signal_max_pct ({})",
                self.signal_min_pct, self.signal_max_pct
            ));
        }
        if !(self.ref_min_bar <= self.ref_max_bar) {
            return Err(format!(
                "ref_min_bar ({}) must not exceed ref_max_bar ({})",
                self.ref_min_bar, self.ref_max_bar
            ));
        }
        if self.ref_min_bar < 0.0 || self.ref_max_bar > self.sensor_max_bar {
            return Err(format!(
                "reference range {}..={} bar exceeds the sensor range 0..={} bar",
                self.ref_min_bar, self.ref_max_bar, self.sensor_max_bar
            ));
        }
        Ok(())
    }
}
