//! Poll loop against a scripted drive, a recording sink and an in-memory
//! dashboard.

use std::sync::Arc;
use std::time::Duration;

use drivesight_bridge_framework::BridgeConfig;
use tokio::sync::mpsc;
use zenoh_bridge_acs400::command::{CommandSource, SetpointCommand};
use zenoh_bridge_acs400::config::Acs400BridgeConfig;
use zenoh_bridge_acs400::dashboard::{DashboardSink, MemoryDashboard, watch_setpoint_pin};
use zenoh_bridge_acs400::gateway::{Gateway, GatewayError};
use zenoh_bridge_acs400::mock::MockTransport;
use zenoh_bridge_acs400::poller::DrivePoller;
use zenoh_bridge_acs400::sink::MemorySink;
use zenoh_bridge_acs400::snapshot::SnapshotValue;

const CONFIG: &str = r#"{
    acs400: {
        device: "booster",
        serial: { port: "/dev/ttyUSB1" },
        write_enabled: true,
        points: [
            { key: "speed", group: 1, index: 2 },
            { key: "output_frequency", group: 1, index: 3 },
            { key: "setpoint", group: 40, index: 20 },
        ],
        read_digital_inputs: false,
        dashboard: {
            token: "test",
            pins: { speed: 0, pressure: 1, relay1: 5 },
            setpoint_pin: 10,
        },
    }
}"#;

fn drive() -> MockTransport {
    MockTransport::new()
        .with_register(102, 1500)
        .with_register(103, 500)
        .with_register(4020, 400)
        .with_register(121, 0b01)
        .with_register(119, 520)
}

fn build(
    transport: &MockTransport,
    dashboard: &Arc<MemoryDashboard>,
    sink: &MemorySink,
) -> DrivePoller<MockTransport> {
    let config = Acs400BridgeConfig::parse(CONFIG).unwrap();
    let catalog = Arc::new(config.build_catalog().unwrap());
    let drive = &config.acs400;

    let gateway = Gateway::new(transport.clone(), catalog)
        .with_pressure_map(drive.pressure.map)
        .with_write_access();

    let pins = drive.dashboard.as_ref().unwrap().pins.clone();
    DrivePoller::new(gateway, drive)
        .with_sink(Arc::new(sink.clone()))
        .with_sink(Arc::new(DashboardSink::new(dashboard.clone(), pins)))
}

#[tokio::test]
async fn snapshot_reaches_both_sinks() {
    let transport = drive();
    let dashboard = Arc::new(MemoryDashboard::new());
    let sink = MemorySink::new();
    let mut poller = build(&transport, &dashboard, &sink);

    let report = poller.tick().await;
    assert_eq!(report.failures, 0);
    assert_eq!(report.delivered, 2);

    let snapshot = &sink.received()[0];
    assert_eq!(snapshot.get("speed"), Some(SnapshotValue::Number(1500.0)));
    assert_eq!(snapshot.get("output_frequency"), Some(SnapshotValue::Number(50.0)));
    assert_eq!(snapshot.get("setpoint"), Some(SnapshotValue::Number(40.0)));
    // AI2 52.0 % -> 4.0 bar
    assert_eq!(snapshot.get("pressure"), Some(SnapshotValue::Number(4.0)));

    assert_eq!(
        dashboard.writes(),
        vec![
            (0, "1500".to_string()),
            (5, "255".to_string()),
            (1, "4".to_string()),
        ]
    );
}

#[tokio::test]
async fn dashboard_outage_does_not_stop_zenoh_sink() {
    let transport = drive();
    let dashboard = Arc::new(MemoryDashboard::new());
    dashboard.set_offline(true);
    let sink = MemorySink::new();
    let mut poller = build(&transport, &dashboard, &sink);

    let report = poller.tick().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(sink.received().len(), 1);
}

#[tokio::test]
async fn rejected_commands_never_touch_the_drive() {
    let transport = drive();
    let dashboard = Arc::new(MemoryDashboard::new());
    let sink = MemorySink::new();
    let mut poller = build(&transport, &dashboard, &sink);

    for (value, expected) in [
        ("4.5", "ValidationRejected"),
        ("-1", "ValidationRejected"),
        ("abc", "InvalidInput"),
        ("inf", "InvalidInput"),
    ] {
        let command = SetpointCommand::new(CommandSource::Zenoh, value);
        let err = poller.apply_command(&command).await.unwrap_err();
        match (&err, expected) {
            (GatewayError::ValidationRejected { .. }, "ValidationRejected") => {}
            (GatewayError::InvalidInput(_), "InvalidInput") => {}
            _ => panic!("{} gave {:?}", value, err),
        }
    }
    assert!(transport.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dashboard_setpoint_flows_to_drive() {
    let transport = drive();
    let dashboard = Arc::new(MemoryDashboard::new());
    dashboard.set_pin(10, "3.0");
    let sink = MemorySink::new();
    let poller = build(&transport, &dashboard, &sink);

    let (tx, rx) = mpsc::channel(8);
    let watcher = tokio::spawn(watch_setpoint_pin(
        dashboard.clone(),
        10,
        Duration::from_secs(2),
        tx,
    ));
    let poll = tokio::spawn(poller.run(rx));

    // Baseline only: a restart must not re-apply the stored pin value.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(transport.writes().is_empty());

    dashboard.set_pin(10, "1.5");
    tokio::time::sleep(Duration::from_secs(2)).await;

    // 1.5 bar -> 32.0 % -> raw 320 at wire address 4019.
    assert_eq!(transport.writes(), vec![(4019, 320)]);

    // The next tick publishes the new setpoint.
    tokio::time::sleep(Duration::from_secs(4)).await;
    let last = sink.received().pop().unwrap();
    assert_eq!(last.get("setpoint"), Some(SnapshotValue::Number(32.0)));

    watcher.abort();
    poll.abort();
}
