//! Drive polling and snapshot fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bitfield::BitfieldValue;
use crate::catalog::register_address;
use crate::command::SetpointCommand;
use crate::config::{Acs400Config, PointConfig};
use crate::gateway::{Gateway, GatewayError, PressureWrite};
use crate::sink::{SnapshotSink, publish_to_all};
use crate::snapshot::{Snapshot, round_to};
use crate::transport::RegisterTransport;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Snapshot entries produced.
    pub values: usize,
    /// Reads that failed.
    pub failures: usize,
    /// Sinks that accepted the snapshot.
    pub delivered: usize,
}

/// Polls the drive on a fixed interval and hands each snapshot to the sinks.
///
/// The poller owns the gateway; setpoint commands are applied between ticks.
pub struct DrivePoller<T> {
    gateway: Gateway<T>,
    device: String,
    interval: Duration,
    points: Vec<PointConfig>,
    read_relays: bool,
    read_digital_inputs: bool,
    pressure_key: Option<String>,
    precision: u32,
    sinks: Vec<Arc<dyn SnapshotSink>>,
}

impl<T: RegisterTransport> DrivePoller<T> {
    pub fn new(gateway: Gateway<T>, config: &Acs400Config) -> Self {
        Self {
            gateway,
            device: config.device.clone(),
            interval: config.poll_interval(),
            points: config.points.clone(),
            read_relays: config.read_relays,
            read_digital_inputs: config.read_digital_inputs,
            pressure_key: config
                .pressure
                .enabled
                .then(|| config.pressure.key.clone()),
            precision: config.precision,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    /// Read every configured value once.
    ///
    /// Failed reads are logged and left out; the second value is the number
    /// of failures.
    pub async fn collect(&mut self) -> (Snapshot, usize) {
        let mut snapshot = Snapshot::new();
        let mut failures = 0;

        for point in &self.points {
            match self.gateway.read_scaled(point.group, point.index).await {
                Ok(reading) => {
                    let value = round_to(reading.scaled, self.precision);
                    match self.gateway.catalog().lookup(point.group, point.index) {
                        Some(entry) => snapshot.push_register(
                            &point.key,
                            value,
                            Some(&entry.unit),
                            entry.address,
                        ),
                        None => snapshot.push_number(&point.key, value, None),
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(device = %self.device, key = %point.key, error = %e, "Read failed");
                }
            }
        }

        if self.read_relays {
            let relays = self.gateway.read_relays().await;
            failures += push_flags(&mut snapshot, &self.device, "relays", relays);
        }

        if self.read_digital_inputs {
            let inputs = self.gateway.read_digital_inputs().await;
            failures += push_flags(&mut snapshot, &self.device, "digital_inputs", inputs);
        }

        if let Some(key) = &self.pressure_key {
            match self.gateway.read_pressure().await {
                Ok(bar) => {
                    let input = self.gateway.pressure_map().input;
                    snapshot.push_register(
                        key,
                        round_to(bar, self.precision),
                        Some("bar"),
                        register_address(input.group, input.index),
                    );
                }
                Err(e) => {
                    failures += 1;
                    warn!(device = %self.device, key = %key, error = %e, "Read failed");
                }
            }
        }

        (snapshot, failures)
    }

    /// One poll-and-publish cycle. An empty snapshot is not published.
    pub async fn tick(&mut self) -> TickReport {
        let (snapshot, failures) = self.collect().await;

        if snapshot.is_empty() {
            warn!(device = %self.device, failures, "No values read; nothing published");
            return TickReport {
                values: 0,
                failures,
                delivered: 0,
            };
        }

        let delivered = publish_to_all(&self.sinks, &snapshot).await;
        debug!(
            device = %self.device,
            values = snapshot.len(),
            failures,
            delivered,
            "Tick complete"
        );

        TickReport {
            values: snapshot.len(),
            failures,
            delivered,
        }
    }

    /// Apply a setpoint command through the gateway's write guards.
    pub async fn apply_command(
        &mut self,
        command: &SetpointCommand,
    ) -> Result<PressureWrite, GatewayError> {
        info!(
            device = %self.device,
            source = %command.source,
            value = %command.value,
            "Pressure reference requested"
        );
        self.gateway.handle_setpoint_input(&command.value).await
    }

    /// Poll forever, applying commands as they arrive.
    ///
    /// Overrunning ticks delay the next one rather than bunching up. Once the
    /// command channel closes the loop keeps polling.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SetpointCommand>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        info!(
            device = %self.device,
            interval_secs = self.interval.as_secs_f64(),
            points = self.points.len(),
            sinks = self.sinks.len(),
            "Starting drive poller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        // Outcome is logged by the gateway.
                        let _ = self.apply_command(&command).await;
                    }
                    None => {
                        debug!(device = %self.device, "Command channel closed");
                        commands_open = false;
                    }
                },
            }
        }
    }
}

fn push_flags(
    snapshot: &mut Snapshot,
    device: &str,
    what: &str,
    value: Result<BitfieldValue, GatewayError>,
) -> usize {
    match value {
        Ok(value) => {
            for flag in value.flags() {
                snapshot.push_flag(flag.name, flag.on);
            }
            0
        }
        Err(e) => {
            warn!(device = %device, what, error = %e, "Read failed");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command::CommandSource;
    use crate::config::{Acs400BridgeConfig, Acs400Config};
    use crate::mock::MockTransport;
    use crate::sink::MemorySink;
    use crate::snapshot::SnapshotValue;
    use crate::transport::TransportError;
    use drivesight_bridge_framework::BridgeConfig;

    fn drive_config(extra: &str) -> Acs400Config {
        let json = format!(
            r#"{{ acs400: {{ serial: {{ port: "/dev/ttyUSB1" }}, {} }} }}"#,
            extra
        );
        Acs400BridgeConfig::parse(&json).unwrap().acs400
    }

    fn healthy_drive() -> MockTransport {
        MockTransport::new()
            .with_register(102, 1450)
            .with_register(103, 498)
            .with_register(104, 31)
            .with_register(106, 55)
            .with_register(110, 412)
            .with_register(117, 0b0101)
            .with_register(121, 0b1001)
            .with_register(119, 360)
    }

    fn poller(transport: &MockTransport, config: &Acs400Config) -> DrivePoller<MockTransport> {
        let gateway = Gateway::new(transport.clone(), Arc::new(Catalog::acs400()));
        DrivePoller::new(gateway, config)
    }

    #[tokio::test]
    async fn full_tick() {
        let transport = healthy_drive();
        let sink = MemorySink::new();
        let mut poller = poller(&transport, &drive_config("")).with_sink(Arc::new(sink.clone()));

        let report = poller.tick().await;
        assert_eq!(
            report,
            TickReport {
                values: 5 + 2 + 5 + 1,
                failures: 0,
                delivered: 1
            }
        );

        let snapshot = &sink.received()[0];
        let keys: Vec<&str> = snapshot.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "speed",
                "output_frequency",
                "current",
                "power",
                "drive_temperature",
                "relay1",
                "relay2",
                "di1",
                "di2",
                "di3",
                "di4",
                "di5",
                "pressure",
            ]
        );
        assert_eq!(snapshot.get("output_frequency"), Some(SnapshotValue::Number(49.8)));
        assert_eq!(snapshot.get("relay1"), Some(SnapshotValue::Flag(true)));
        assert_eq!(snapshot.get("relay2"), Some(SnapshotValue::Flag(false)));
        assert_eq!(snapshot.get("di3"), Some(SnapshotValue::Flag(true)));
        assert_eq!(snapshot.get("di5"), Some(SnapshotValue::Flag(true)));
        // AI2 36.0 % -> 2.0 bar
        assert_eq!(snapshot.get("pressure"), Some(SnapshotValue::Number(2.0)));
        assert_eq!(snapshot.entries()[0].unit.as_deref(), Some("rpm"));

        let addresses: Vec<Option<u16>> = snapshot.entries().iter().map(|e| e.address).collect();
        assert_eq!(addresses[0], Some(102));
        assert_eq!(addresses[5], None);
        assert_eq!(addresses[12], Some(119));
    }

    #[tokio::test]
    async fn one_failing_register_does_not_block_others() {
        let transport = healthy_drive().with_failure(104, TransportError::Timeout(1000));
        let sink = MemorySink::new();
        let mut poller = poller(&transport, &drive_config("")).with_sink(Arc::new(sink.clone()));

        let report = poller.tick().await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.values, 12);

        let snapshot = &sink.received()[0];
        assert!(snapshot.get("current").is_none());
        assert!(snapshot.get("power").is_some());
        assert!(snapshot.get("pressure").is_some());
    }

    #[tokio::test]
    async fn all_failed_tick_publishes_nothing() {
        let transport = MockTransport::new();
        let sink = MemorySink::new();
        let mut poller = poller(&transport, &drive_config("")).with_sink(Arc::new(sink.clone()));

        let report = poller.tick().await;
        assert_eq!(report.values, 0);
        assert_eq!(report.failures, 5 + 2 + 1);
        assert_eq!(report.delivered, 0);
        assert!(sink.received().is_empty());
    }

    #[tokio::test]
    async fn optional_reads_can_be_disabled() {
        let transport = healthy_drive();
        let config = drive_config(
            r#"points: [{ key: "speed", group: 1, index: 2 }],
               read_relays: false, read_digital_inputs: false,
               pressure: { enabled: false }"#,
        );
        let sink = MemorySink::new();
        let mut poller = poller(&transport, &config).with_sink(Arc::new(sink.clone()));

        poller.tick().await;
        assert_eq!(sink.received()[0].len(), 1);
        assert_eq!(transport.reads(), vec![101]);
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let transport = healthy_drive();
        let good = MemorySink::new();
        let mut poller = poller(&transport, &drive_config(""))
            .with_sink(Arc::new(MemorySink::failing()))
            .with_sink(Arc::new(good.clone()));

        let report = poller.tick().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(good.received().len(), 1);
    }

    #[tokio::test]
    async fn commands_respect_write_gate() {
        let transport = healthy_drive();
        let mut poller = poller(&transport, &drive_config(""));

        let command = SetpointCommand::new(CommandSource::Zenoh, "2.0");
        assert_eq!(
            poller.apply_command(&command).await,
            Err(GatewayError::WriteDisabled)
        );
        assert!(transport.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_polls_and_applies_commands() {
        let transport = healthy_drive();
        let sink = MemorySink::new();
        let gateway =
            Gateway::new(transport.clone(), Arc::new(Catalog::acs400())).with_write_access();
        let poller = DrivePoller::new(gateway, &drive_config("")).with_sink(Arc::new(sink.clone()));

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(poller.run(rx));

        // Ticks at 0 s, 4 s and 8 s.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(sink.received().len(), 3);

        tx.send(SetpointCommand::new(CommandSource::Dashboard, "2.5"))
            .await
            .unwrap();
        tx.send(SetpointCommand::new(CommandSource::Zenoh, "9.0"))
            .await
            .unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_secs(4)).await;

        // Only the in-range reference reaches the drive.
        assert_eq!(transport.writes(), vec![(4019, 400)]);
        assert_eq!(transport.register(4020), Some(400));
        // Polling continues after the channel closes.
        assert_eq!(sink.received().len(), 4);

        task.abort();
    }
}
