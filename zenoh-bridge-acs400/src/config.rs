//! Configuration for the ACS400 bridge.

use std::collections::HashSet;
use std::time::Duration;

use drivesight_bridge_framework::{
    BridgeConfig, BridgeError, Format, LoggingConfig, Result, ZenohConfig,
};
use serde::{Deserialize, Serialize};

use crate::bitfield::{DIGITAL_INPUTS, RELAYS};
use crate::catalog::{Catalog, Scale};
use crate::dashboard::DashboardConfig;
use crate::pressure::PressureMap;
use crate::transport::SerialConfig;

/// Most decimal places a published value may keep.
pub const MAX_PRECISION: u32 = 6;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acs400BridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Drive settings
    pub acs400: Acs400Config,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telemetry payload format
    #[serde(default)]
    pub serialization: Format,
}

/// Drive and polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acs400Config {
    /// Key expression prefix (default: "drivesight/acs400")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Device name (used in key expressions)
    #[serde(default = "default_device")]
    pub device: String,

    /// Serial line to the drive
    pub serial: SerialConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Allow pressure reference writes
    #[serde(default)]
    pub write_enabled: bool,

    /// Decimal places kept in published values
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Registers published every tick
    #[serde(default = "default_points")]
    pub points: Vec<PointConfig>,

    /// Publish relay output states
    #[serde(default = "default_true")]
    pub read_relays: bool,

    /// Publish digital input states
    #[serde(default = "default_true")]
    pub read_digital_inputs: bool,

    /// Pressure sensor
    #[serde(default)]
    pub pressure: PressureConfig,

    /// Registers added to the built-in catalog
    #[serde(default)]
    pub extra_registers: Vec<ExtraRegister>,

    /// Remote dashboard
    #[serde(default)]
    pub dashboard: Option<DashboardConfig>,
}

fn default_key_prefix() -> String {
    "drivesight/acs400".to_string()
}

fn default_device() -> String {
    "acs400".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    4
}

fn default_precision() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_points() -> Vec<PointConfig> {
    [
        ("speed", 1, 2),
        ("output_frequency", 1, 3),
        ("current", 1, 4),
        ("power", 1, 6),
        ("drive_temperature", 1, 10),
    ]
    .into_iter()
    .map(|(key, group, index)| PointConfig {
        key: key.to_string(),
        group,
        index,
    })
    .collect()
}

/// A catalog register published under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointConfig {
    pub key: String,
    pub group: u16,
    pub index: u16,
}

/// Pressure reading and reference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureConfig {
    /// Publish the process pressure every tick
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Snapshot key for the pressure value
    #[serde(default = "default_pressure_key")]
    pub key: String,
    /// Sensor map, reference limits and registers
    #[serde(default)]
    pub map: PressureMap,
}

fn default_pressure_key() -> String {
    "pressure".to_string()
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: default_pressure_key(),
            map: PressureMap::default(),
        }
    }
}

/// A register missing from the built-in table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRegister {
    pub group: u16,
    pub index: u16,
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Raw value is divided by this (1, 10, 100, ...)
    #[serde(default = "default_divisor")]
    pub divisor: u32,
}

fn default_unit() -> String {
    "-".to_string()
}

fn default_divisor() -> u32 {
    1
}

impl BridgeConfig for Acs400BridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.acs400.key_prefix
    }

    fn serialization(&self) -> Format {
        self.serialization
    }

    fn validate(&self) -> Result<()> {
        let drive = &self.acs400;

        if drive.device.is_empty() || drive.device.contains(['/', '*', '?', '$', '#']) {
            return Err(BridgeError::validation(format!(
                "invalid device name '{}'",
                drive.device
            )));
        }

        if drive.serial.port.is_empty() {
            return Err(BridgeError::validation("serial.port cannot be empty"));
        }

        match drive.serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            other => {
                return Err(BridgeError::validation(format!(
                    "invalid parity '{}' (use none, even, or odd)",
                    other
                )));
            }
        }

        if !(1..=247).contains(&drive.unit_id) {
            return Err(BridgeError::validation("unit_id must be 1-247"));
        }

        if drive.timeout_ms == 0 {
            return Err(BridgeError::validation("timeout_ms must be > 0"));
        }

        if drive.poll_interval_secs == 0 {
            return Err(BridgeError::validation("poll_interval_secs must be > 0"));
        }

        if drive.precision > MAX_PRECISION {
            return Err(BridgeError::validation(format!(
                "precision must be 0-{}",
                MAX_PRECISION
            )));
        }

        drive
            .pressure
            .map
            .check()
            .map_err(|e| BridgeError::validation(format!("pressure: {}", e)))?;

        let catalog = self.build_catalog()?;

        // Flags and pressure share the snapshot key space with points.
        let mut keys = HashSet::new();
        if drive.read_relays {
            keys.extend(RELAYS.fields().iter().map(|f| f.name));
        }
        if drive.read_digital_inputs {
            keys.extend(DIGITAL_INPUTS.fields().iter().map(|f| f.name));
        }
        if drive.pressure.enabled {
            if drive.pressure.key.is_empty() {
                return Err(BridgeError::validation("pressure.key cannot be empty"));
            }
            if !keys.insert(drive.pressure.key.as_str()) {
                return Err(BridgeError::validation(format!(
                    "pressure.key '{}' is already used by a flag",
                    drive.pressure.key
                )));
            }
        }

        for point in &drive.points {
            if catalog.lookup(point.group, point.index).is_none() {
                return Err(BridgeError::validation(format!(
                    "point '{}': register {:02}{:02} is not in the catalog",
                    point.key, point.group, point.index
                )));
            }
            if !keys.insert(point.key.as_str()) {
                return Err(BridgeError::validation(format!(
                    "point key '{}' is used more than once in the snapshot",
                    point.key
                )));
            }
        }

        let map = &drive.pressure.map;
        for (what, target) in [("input", map.input), ("setpoint", map.setpoint)] {
            if catalog.lookup(target.group, target.index).is_none() {
                return Err(BridgeError::validation(format!(
                    "pressure {} register {:02}{:02} is not in the catalog",
                    what, target.group, target.index
                )));
            }
        }

        if let Some(dashboard) = &drive.dashboard {
            if dashboard.token.is_empty() {
                return Err(BridgeError::validation("dashboard.token cannot be empty"));
            }
            if let Some(pin) = dashboard.setpoint_pin {
                if dashboard.setpoint_poll_secs == 0 {
                    return Err(BridgeError::validation(
                        "dashboard.setpoint_poll_secs must be > 0",
                    ));
                }
                // Telemetry written to the setpoint pin would come back as a command.
                if let Some((key, _)) = dashboard.pins.iter().find(|(_, p)| **p == pin) {
                    return Err(BridgeError::validation(format!(
                        "dashboard pin V{} is both the setpoint pin and the output for '{}'",
                        pin, key
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Acs400BridgeConfig {
    /// Built-in catalog plus `extra_registers`.
    pub fn build_catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::acs400();
        for extra in &self.acs400.extra_registers {
            catalog
                .insert(
                    extra.group,
                    extra.index,
                    Scale::new(1, extra.divisor),
                    &extra.name,
                    &extra.unit,
                )
                .map_err(|e| BridgeError::validation(format!("extra_registers: {}", e)))?;
        }
        Ok(catalog)
    }
}

impl Acs400Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        acs400: { serial: { port: "/dev/ttyUSB1" } }
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Acs400BridgeConfig::parse(MINIMAL).unwrap();
        let drive = &config.acs400;

        assert_eq!(config.key_prefix(), "drivesight/acs400");
        assert_eq!(config.serialization(), Format::Json);
        assert_eq!(drive.device, "acs400");
        assert_eq!(drive.serial.baud_rate, 9600);
        assert_eq!(drive.unit_id, 1);
        assert_eq!(drive.timeout(), Duration::from_millis(1000));
        assert_eq!(drive.poll_interval(), Duration::from_secs(4));
        assert!(!drive.write_enabled);
        assert_eq!(drive.precision, 1);
        assert_eq!(drive.points.len(), 5);
        assert_eq!(drive.points[0].key, "speed");
        assert!(drive.read_relays && drive.read_digital_inputs);
        assert!(drive.pressure.enabled);
        assert_eq!(drive.pressure.key, "pressure");
        assert_eq!(drive.pressure.map, PressureMap::default());
        assert!(drive.dashboard.is_none());
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            zenoh: { mode: "client", connect: ["tcp/10.0.0.1:7447"] },
            serialization: "cbor",
            logging: { level: "debug", format: "json" },
            acs400: {
                key_prefix: "plant/drives",
                device: "booster-pump",
                serial: { port: "/dev/ttyUSB0", baud_rate: 19200, parity: "even" },
                unit_id: 3,
                write_enabled: true,
                points: [
                    { key: "speed", group: 1, index: 2 },
                    { key: "aux_motors", group: 81, index: 17 },
                ],
                read_digital_inputs: false,
                pressure: { key: "line_pressure", map: { sensor_max_bar: 16, ref_max_bar: 6 } },
                extra_registers: [
                    { group: 81, index: 17, name: "Nbr of Aux Mot" },
                ],
                dashboard: { token: "secret", pins: { speed: 0, line_pressure: 1 }, setpoint_pin: 10 },
            }
        }"#;

        let config = Acs400BridgeConfig::parse(json).unwrap();
        assert_eq!(config.serialization(), Format::Cbor);
        assert_eq!(config.zenoh().mode, "client");
        assert_eq!(config.key_prefix(), "plant/drives");

        let drive = &config.acs400;
        assert_eq!(drive.unit_id, 3);
        assert!(drive.write_enabled);
        assert!(!drive.read_digital_inputs);
        assert_eq!(drive.pressure.map.sensor_max_bar, 16.0);
        assert_eq!(drive.pressure.map.ref_max_bar, 6.0);

        let catalog = config.build_catalog().unwrap();
        let aux = catalog.lookup(81, 17).unwrap();
        assert_eq!(aux.address, 8117);
        assert_eq!(aux.scale, Scale::UNIT);
        assert_eq!(aux.unit, "-");

        let dashboard = drive.dashboard.as_ref().unwrap();
        assert_eq!(dashboard.pins.get("line_pressure"), Some(&1));
    }

    #[test]
    fn test_point_must_exist() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                points: [{ key: "mystery", group: 1, index: 8 }],
            }
        }"#;
        assert!(matches!(
            Acs400BridgeConfig::parse(json),
            Err(BridgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_duplicate_point_keys() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                points: [
                    { key: "speed", group: 1, index: 2 },
                    { key: "speed", group: 1, index: 3 },
                ],
            }
        }"#;
        assert!(Acs400BridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_point_keys_cannot_shadow_flags_or_pressure() {
        for points in [
            r#"[{ key: "pressure", group: 1, index: 2 }]"#,
            r#"[{ key: "relay1", group: 1, index: 3 }]"#,
            r#"[{ key: "di5", group: 1, index: 3 }]"#,
        ] {
            let json = format!(
                r#"{{ acs400: {{ serial: {{ port: "/dev/ttyUSB1" }}, points: {} }} }}"#,
                points
            );
            let err = Acs400BridgeConfig::parse(&json).unwrap_err();
            assert!(err.to_string().contains("used more than once"), "{}", err);
        }
    }

    #[test]
    fn test_disabled_reads_free_their_keys() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                read_relays: false,
                read_digital_inputs: false,
                pressure: { enabled: false },
                points: [
                    { key: "relay1", group: 1, index: 2 },
                    { key: "di1", group: 1, index: 3 },
                    { key: "pressure", group: 1, index: 19 },
                ],
            }
        }"#;
        assert!(Acs400BridgeConfig::parse(json).is_ok());
    }

    #[test]
    fn test_pressure_key_cannot_be_a_flag() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                pressure: { key: "relay2" },
            }
        }"#;
        let err = Acs400BridgeConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("already used by a flag"));
    }

    #[test]
    fn test_setpoint_pin_is_not_an_output() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                dashboard: { token: "t", pins: { pid_setpoint: 10 }, setpoint_pin: 10 },
            }
        }"#;
        let err = Acs400BridgeConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("V10"));

        let ok = json.replace("pid_setpoint: 10", "pid_setpoint: 11");
        assert!(Acs400BridgeConfig::parse(&ok).is_ok());
    }

    #[test]
    fn test_extra_register_collision() {
        let json = r#"{
            acs400: {
                serial: { port: "/dev/ttyUSB1" },
                extra_registers: [{ group: 1, index: 2, name: "Speed twice" }],
            }
        }"#;
        let err = Acs400BridgeConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_invalid_values() {
        for drive in [
            r#"serial: { port: "/dev/ttyUSB1" }, unit_id: 0"#,
            r#"serial: { port: "/dev/ttyUSB1" }, poll_interval_secs: 0"#,
            r#"serial: { port: "/dev/ttyUSB1", parity: "mark" }"#,
            r#"serial: { port: "" }"#,
            r#"serial: { port: "/dev/ttyUSB1" }, device: "a/b""#,
            r#"serial: { port: "/dev/ttyUSB1" }, pressure: { map: { ref_max_bar: 20 } }"#,
            r#"serial: { port: "/dev/ttyUSB1" }, dashboard: { token: "" }"#,
            r#"serial: { port: "/dev/ttyUSB1" }, precision: 7"#,
            r#"serial: { port: "/dev/ttyUSB1" }, precision: 400"#,
            r#"serial: { port: "/dev/ttyUSB1" }, pressure: { key: "" }"#,
        ] {
            let json = format!("{{ acs400: {{ {} }} }}", drive);
            assert!(
                Acs400BridgeConfig::parse(&json).is_err(),
                "accepted: {}",
                drive
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Acs400BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.acs400.serial.port, "/dev/ttyUSB1");
    }
}
