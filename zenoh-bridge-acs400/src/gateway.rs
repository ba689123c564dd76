//! Typed access to the drive.
//!
//! [`Gateway`] turns catalog entries into single-register Modbus reads and
//! writes, applies scale factors, decodes packed status words and guards
//! writes. Every call is one best-effort round-trip: failures come back as
//! [`GatewayError`] values and are never retried here.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bitfield::{BitSpec, BitfieldValue, DIGITAL_INPUTS, RELAYS};
use crate::catalog::{ACS400_PARAMETER_GROUPS, Catalog, MAX_INDEX, RegisterEntry, register_address};
use crate::pressure::PressureMap;
use crate::transport::RegisterTransport;

/// Failure of one gateway operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// The drive did not answer properly (timeout, CRC, exception, ...).
    #[error("register {address:04}: {reason}")]
    Transport { address: u16, reason: String },
    #[error("register {group:02}{index:02} not found")]
    NotFound { group: u16, index: u16 },
    #[error("group {0} not found")]
    UnknownGroup(u16),
    #[error("{value} outside accepted range {min}..={max}")]
    ValidationRejected { value: f64, min: f64, max: f64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("write access not granted")]
    WriteDisabled,
}

/// A successful scaled read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub raw: u16,
    pub scaled: f64,
}

/// Acknowledgement of a pressure reference write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureWrite {
    pub bar: f64,
    /// Setpoint in % of the sensor signal range.
    pub signal_pct: f64,
    /// Value written to the setpoint register.
    pub raw: u16,
    /// 1-based register written.
    pub address: u16,
}

/// One line of a diagnostic dump.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpEntry {
    /// 1-based device address.
    pub address: u16,
    /// Catalog metadata, when the register is known.
    pub entry: Option<RegisterEntry>,
    pub outcome: Result<Reading, GatewayError>,
}

/// Drive access over a register transport.
pub struct Gateway<T> {
    transport: T,
    catalog: Arc<Catalog>,
    pressure: PressureMap,
    write_access: bool,
}

impl<T: RegisterTransport> Gateway<T> {
    /// Create a read-only gateway.
    pub fn new(transport: T, catalog: Arc<Catalog>) -> Self {
        Self {
            transport,
            catalog,
            pressure: PressureMap::default(),
            write_access: false,
        }
    }

    /// Use a non-default pressure sensor map.
    pub fn with_pressure_map(mut self, pressure: PressureMap) -> Self {
        self.pressure = pressure;
        self
    }

    /// Allow writes to the drive.
    pub fn with_write_access(mut self) -> Self {
        warn!("Write access to the drive is ENABLED; setpoint commands will change the running process");
        self.write_access = true;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pressure_map(&self) -> &PressureMap {
        &self.pressure
    }

    pub fn write_enabled(&self) -> bool {
        self.write_access
    }

    /// Read one register by its 1-based device address.
    pub async fn read_raw(&mut self, address: u16) -> Result<u16, GatewayError> {
        let wire = wire_address(address)?;
        let words = self
            .transport
            .read_holding_registers(wire, 1)
            .await
            .map_err(|e| GatewayError::Transport {
                address,
                reason: e.to_string(),
            })?;

        words.first().copied().ok_or_else(|| GatewayError::Transport {
            address,
            reason: "empty response".to_string(),
        })
    }

    /// Read a catalog register and apply its scale.
    pub async fn read_scaled(&mut self, group: u16, index: u16) -> Result<Reading, GatewayError> {
        let entry = self
            .catalog
            .lookup(group, index)
            .ok_or(GatewayError::NotFound { group, index })?;
        let (address, scale) = (entry.address, entry.scale);

        let raw = self.read_raw(address).await?;
        Ok(Reading {
            raw,
            scaled: scale.apply(raw),
        })
    }

    /// Read the registers named by `spec` and decode its flags.
    ///
    /// Each register is read once; any failed read fails the whole value.
    pub async fn read_bitfield(&mut self, spec: &BitSpec) -> Result<BitfieldValue, GatewayError> {
        let mut words = Vec::new();
        for address in spec.addresses() {
            words.push((address, self.read_raw(address).await?));
        }
        Ok(spec.decode(&words))
    }

    /// Relay output states.
    pub async fn read_relays(&mut self) -> Result<BitfieldValue, GatewayError> {
        self.read_bitfield(&RELAYS).await
    }

    /// Digital input states DI1-DI5.
    pub async fn read_digital_inputs(&mut self) -> Result<BitfieldValue, GatewayError> {
        self.read_bitfield(&DIGITAL_INPUTS).await
    }

    /// Current process pressure in bar, from the sensor analog input.
    pub async fn read_pressure(&mut self) -> Result<f64, GatewayError> {
        let input = self.pressure.input;
        let signal = self.read_scaled(input.group, input.index).await?;
        Ok(self.pressure.to_pressure(signal.scaled))
    }

    /// Write a pressure reference in bar to the setpoint register.
    ///
    /// Rejected inputs never reach the transport.
    pub async fn write_pressure_reference(
        &mut self,
        bar: f64,
    ) -> Result<PressureWrite, GatewayError> {
        if !bar.is_finite() {
            let err = GatewayError::InvalidInput(format!("pressure reference {bar} is not finite"));
            warn!(error = %err, "Pressure reference rejected");
            return Err(err);
        }
        if !self.pressure.accepts(bar) {
            let err = GatewayError::ValidationRejected {
                value: bar,
                min: self.pressure.ref_min_bar,
                max: self.pressure.ref_max_bar,
            };
            warn!(bar, error = %err, "Pressure reference rejected");
            return Err(err);
        }
        if !self.write_access {
            warn!(bar, "Pressure reference not written: write access not granted");
            return Err(GatewayError::WriteDisabled);
        }

        let target = self.pressure.setpoint;
        let entry = self
            .catalog
            .lookup(target.group, target.index)
            .ok_or(GatewayError::NotFound {
                group: target.group,
                index: target.index,
            })?;
        let (address, scale) = (entry.address, entry.scale);

        let signal_pct = self.pressure.to_signal(bar);
        let raw = scale.unapply(signal_pct).ok_or_else(|| {
            GatewayError::InvalidInput(format!(
                "{signal_pct} % does not fit register {address:04}"
            ))
        })?;

        let wire = wire_address(address)?;
        self.transport
            .write_single_register(wire, raw)
            .await
            .map_err(|e| GatewayError::Transport {
                address,
                reason: e.to_string(),
            })?;

        info!(bar, signal_pct, raw, address, "Pressure reference written");
        Ok(PressureWrite {
            bar,
            signal_pct,
            raw,
            address,
        })
    }

    /// Parse a pressure reference received from a sink and write it.
    pub async fn handle_setpoint_input(
        &mut self,
        input: &str,
    ) -> Result<PressureWrite, GatewayError> {
        let bar: f64 = input.trim().parse().map_err(|_| {
            let err = GatewayError::InvalidInput(format!("'{}' is not a number", input.trim()));
            warn!(error = %err, "Pressure reference rejected");
            err
        })?;
        self.write_pressure_reference(bar).await
    }

    /// Read every catalog register of a group.
    ///
    /// A failed register is reported in its entry and the scan continues.
    pub async fn dump_group(&mut self, group: u16) -> Result<Vec<DumpEntry>, GatewayError> {
        let entries: Vec<RegisterEntry> = self
            .catalog
            .group(group)
            .ok_or(GatewayError::UnknownGroup(group))?
            .entries()
            .to_vec();

        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = self.read_scaled(entry.group, entry.index).await;
            match &outcome {
                Ok(reading) => info!(
                    address = %entry.code(),
                    value = reading.scaled,
                    unit = %entry.unit,
                    name = %entry.name,
                    "Register"
                ),
                Err(e) => error!(address = %entry.code(), name = %entry.name, error = %e, "Could not read register"),
            }
            lines.push(DumpEntry {
                address: entry.address,
                entry: Some(entry),
                outcome,
            });
        }
        Ok(lines)
    }

    /// Probe indices 1..=99 of every ACS400 parameter group.
    ///
    /// Registers the catalog knows are scaled; others are reported raw.
    /// Missing parameters are expected, so failures are logged at debug level.
    pub async fn dump_all(&mut self) -> Vec<DumpEntry> {
        let mut lines = Vec::new();
        for group in ACS400_PARAMETER_GROUPS {
            for index in 1..=MAX_INDEX {
                let address = register_address(group, index);
                let code = format!("{address:04}");
                let entry = self.catalog.lookup(group, index).cloned();
                let outcome = self.read_raw(address).await.map(|raw| Reading {
                    raw,
                    scaled: entry.as_ref().map_or(raw as f64, |e| e.scale.apply(raw)),
                });
                match &outcome {
                    Ok(reading) => info!(
                        address = %code,
                        value = reading.scaled,
                        unit = entry.as_ref().map_or("", |e| e.unit.as_str()),
                        name = entry.as_ref().map_or("", |e| e.name.as_str()),
                        "Register"
                    ),
                    Err(e) => debug!(address = %code, error = %e, "Probe failed"),
                }
                lines.push(DumpEntry {
                    address,
                    entry,
                    outcome,
                });
            }
        }
        lines
    }
}

/// Device registers are numbered from 1; the wire protocol counts from 0.
fn wire_address(address: u16) -> Result<u16, GatewayError> {
    address
        .checked_sub(1)
        .ok_or_else(|| GatewayError::InvalidInput("register address 0 does not exist".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::TransportError;

    fn gateway(transport: &MockTransport) -> Gateway<MockTransport> {
        Gateway::new(transport.clone(), Arc::new(Catalog::acs400()))
    }

    #[tokio::test]
    async fn read_scaled_uses_zero_based_wire_address() {
        let transport = MockTransport::new()
            .with_register(102, 1500)
            .with_register(103, 500);
        let mut gw = gateway(&transport);

        let speed = gw.read_scaled(1, 2).await.unwrap();
        assert_eq!(speed, Reading { raw: 1500, scaled: 1500.0 });

        let freq = gw.read_scaled(1, 3).await.unwrap();
        assert_eq!(freq.scaled, 50.0);

        assert_eq!(transport.reads(), vec![101, 102]);
    }

    #[tokio::test]
    async fn every_catalog_entry_reads_its_own_address() {
        let transport = MockTransport::new();
        let catalog = Catalog::acs400();
        for group in catalog.groups() {
            for entry in group.entries() {
                transport.set_register(entry.address, 10);
            }
        }
        let mut gw = gateway(&transport);

        for group in catalog.groups() {
            for entry in group.entries() {
                let reading = gw.read_scaled(entry.group, entry.index).await.unwrap();
                assert_eq!(reading.scaled, 10.0 * entry.scale.factor());
                assert_eq!(
                    transport.reads().last().copied(),
                    Some(entry.group * 100 + entry.index - 1)
                );
            }
        }
    }

    #[tokio::test]
    async fn not_found_skips_transport() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport);

        assert_eq!(
            gw.read_scaled(1, 8).await,
            Err(GatewayError::NotFound { group: 1, index: 8 })
        );
        assert!(transport.reads().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_wrapped() {
        let transport = MockTransport::new().with_failure(104, TransportError::Timeout(1000));
        let mut gw = gateway(&transport);

        match gw.read_scaled(1, 4).await {
            Err(GatewayError::Transport { address, reason }) => {
                assert_eq!(address, 104);
                assert!(reason.contains("1000 ms"));
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_raw_rejects_address_zero() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport);
        assert!(matches!(
            gw.read_raw(0).await,
            Err(GatewayError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn relays_and_inputs() {
        let transport = MockTransport::new()
            .with_register(121, 0b1010)
            .with_register(117, 0b0110);
        let mut gw = gateway(&transport);

        let relays = gw.read_relays().await.unwrap();
        assert_eq!(relays.bits(), vec![0, 1]);

        let inputs = gw.read_digital_inputs().await.unwrap();
        assert_eq!(inputs.bits(), vec![0, 1, 1, 0, 1]);
        assert_eq!(transport.reads(), vec![120, 116, 120]);
    }

    #[tokio::test]
    async fn bitfield_fails_if_any_word_fails() {
        let transport = MockTransport::new().with_register(117, 0b1111);
        let mut gw = gateway(&transport);

        assert!(matches!(
            gw.read_digital_inputs().await,
            Err(GatewayError::Transport { address: 121, .. })
        ));
    }

    #[tokio::test]
    async fn pressure_from_ai2() {
        // AI2 = 60.0 % -> 5 bar
        let transport = MockTransport::new().with_register(119, 600);
        let mut gw = gateway(&transport);

        let bar = gw.read_pressure().await.unwrap();
        assert!((bar - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pressure_read_failure() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport);
        assert!(matches!(
            gw.read_pressure().await,
            Err(GatewayError::Transport { address: 119, .. })
        ));
    }

    #[tokio::test]
    async fn pressure_reference_write_round_trips() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport).with_write_access();
        let map = *gw.pressure_map();

        for p in [0.0, 0.5, 1.0, 2.37, 3.5, 4.0] {
            let ack = gw.write_pressure_reference(p).await.unwrap();
            let expected = ((p * (100.0 - 20.0) / 10.0 + 20.0) / 0.1).round() as u16;
            assert_eq!(ack.raw, expected);
            assert_eq!(ack.address, 4020);
            assert_eq!(transport.writes().last(), Some(&(4019, expected)));

            let recovered = map.to_pressure(ack.raw as f64 * 0.1);
            assert!((recovered - p).abs() <= 0.0125 / 2.0 + 1e-9, "{p} -> {recovered}");
        }
    }

    #[tokio::test]
    async fn out_of_range_reference_never_written() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport).with_write_access();

        for p in [-0.5, 4.01, 10.0] {
            assert!(matches!(
                gw.write_pressure_reference(p).await,
                Err(GatewayError::ValidationRejected { .. })
            ));
        }
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn writes_need_explicit_access() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport);

        assert!(!gw.write_enabled());
        assert_eq!(
            gw.write_pressure_reference(2.0).await,
            Err(GatewayError::WriteDisabled)
        );
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn setpoint_input_parsing() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport).with_write_access();

        assert!(matches!(
            gw.handle_setpoint_input("two bar").await,
            Err(GatewayError::InvalidInput(_))
        ));
        assert!(matches!(
            gw.handle_setpoint_input("NaN").await,
            Err(GatewayError::InvalidInput(_))
        ));
        assert!(transport.writes().is_empty());

        let ack = gw.handle_setpoint_input(" 2.5\n").await.unwrap();
        assert_eq!(ack.raw, 400);
    }

    #[tokio::test]
    async fn dump_group_continues_after_failure() {
        let transport = MockTransport::new()
            .with_register(4020, 440);
        let mut gw = gateway(&transport);

        let lines = gw.dump_group(40).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].outcome.as_ref().unwrap().scaled, 44.0);

        let transport = MockTransport::new()
            .with_register(102, 1450)
            .with_register(137, 3);
        let mut gw = gateway(&transport);
        let lines = gw.dump_group(1).await.unwrap();
        assert_eq!(lines.len(), Catalog::acs400().group(1).unwrap().entries().len());
        assert!(lines[0].outcome.is_ok());
        assert!(lines[1].outcome.is_err());
        assert_eq!(lines.last().unwrap().outcome.as_ref().unwrap().raw, 3);
    }

    #[tokio::test]
    async fn dump_unknown_group() {
        let transport = MockTransport::new();
        let mut gw = gateway(&transport);
        assert_eq!(gw.dump_group(7).await, Err(GatewayError::UnknownGroup(7)));
    }

    #[tokio::test]
    async fn dump_all_probes_every_group() {
        let transport = MockTransport::new()
            .with_register(8117, 1)
            .with_register(103, 498);
        let mut gw = gateway(&transport);

        let lines = gw.dump_all().await;
        assert_eq!(lines.len(), ACS400_PARAMETER_GROUPS.len() * 99);

        let ok: Vec<&DumpEntry> = lines.iter().filter(|l| l.outcome.is_ok()).collect();
        assert_eq!(ok.len(), 2);
        let freq = ok.iter().find(|l| l.address == 103).unwrap();
        assert!((freq.outcome.as_ref().unwrap().scaled - 49.8).abs() < 1e-9);
        let aux = ok.iter().find(|l| l.address == 8117).unwrap();
        assert!(aux.entry.is_none());
        assert_eq!(aux.outcome.as_ref().unwrap().scaled, 1.0);
    }
}
