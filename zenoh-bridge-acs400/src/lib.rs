//! Zenoh bridge for ABB ACS400 drives.
//!
//! This bridge polls an ACS400 over Modbus RTU, converts raw register values
//! to engineering units and publishes them to Zenoh and, optionally, to a
//! Blynk dashboard. Pressure reference writes can be sent back to the drive
//! when write access is enabled.
//!
//! # Key Expressions
//!
//! ```text
//! <key_prefix>/<device>/<key>                               telemetry
//! <key_prefix>/<device>/@/commands/pressure_reference      setpoint (bar)
//! <key_prefix>/@/status                                    bridge status
//! ```
//!
//! Where:
//! - `<key_prefix>` - defaults to `drivesight/acs400`
//! - `<device>` - device name from configuration
//! - `<key>` - point key (`speed`, `output_frequency`, ...), flag name
//!   (`relay1`, `di5`, ...) or the pressure key

pub mod bitfield;
pub mod catalog;
pub mod command;
pub mod config;
pub mod dashboard;
pub mod gateway;
pub mod mock;
pub mod poller;
pub mod pressure;
pub mod sink;
pub mod snapshot;
pub mod transport;
