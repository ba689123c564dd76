//! Remote dashboard (Blynk) integration.
//!
//! Snapshot values go to virtual pins; the pressure reference comes back by
//! watching a setpoint pin.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::command::{CommandSource, SetpointCommand};
use crate::sink::{SinkError, SnapshotSink};
use crate::snapshot::{Snapshot, SnapshotValue};

/// Virtual pin value written for an active flag.
pub const FLAG_ON: &str = "255";
/// Virtual pin value written for an inactive flag.
pub const FLAG_OFF: &str = "0";

/// Dashboard section of the bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// API server (default: "https://blynk.cloud")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Device auth token
    pub token: String,
    /// Snapshot key -> virtual pin
    #[serde(default)]
    pub pins: BTreeMap<String, u8>,
    /// Pin the operator writes the pressure reference to
    #[serde(default)]
    pub setpoint_pin: Option<u8>,
    /// How often the setpoint pin is read (default: 2 s)
    #[serde(default = "default_setpoint_poll_secs")]
    pub setpoint_poll_secs: u64,
    /// HTTP request timeout in milliseconds (default: 5000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://blynk.cloud".to_string()
}

fn default_setpoint_poll_secs() -> u64 {
    2
}

fn default_request_timeout_ms() -> u64 {
    5000
}

/// Virtual pin access on a dashboard server.
#[async_trait]
pub trait DashboardClient: Send + Sync {
    async fn virtual_write(&self, pin: u8, value: &str) -> Result<(), SinkError>;

    async fn read_virtual_pin(&self, pin: u8) -> Result<String, SinkError>;
}

/// Blynk HTTP API client.
#[derive(Debug, Clone)]
pub struct BlynkClient {
    http: Client,
    base_url: String,
    token: String,
}

impl BlynkClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self, SinkError> {
        Self::new(
            &config.base_url,
            &config.token,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<String, SinkError> {
        let url = format!("{}/external/api/{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(SinkError::Rejected(format!("{} - {}", status, body.trim())))
        }
    }
}

#[async_trait]
impl DashboardClient for BlynkClient {
    async fn virtual_write(&self, pin: u8, value: &str) -> Result<(), SinkError> {
        self.get("update", &[(format!("V{pin}"), value.to_string())])
            .await
            .map(|_| ())
    }

    async fn read_virtual_pin(&self, pin: u8) -> Result<String, SinkError> {
        let body = self.get("get", &[(format!("V{pin}"), String::new())]).await?;
        Ok(pin_value(&body))
    }
}

/// Normalize a pin read body: `2.5`, `"2.5"` and `["2.5"]` all give `2.5`.
fn pin_value(body: &str) -> String {
    body.trim()
        .trim_matches(&['[', ']'][..])
        .trim()
        .trim_matches('"')
        .to_string()
}

/// Text written to a virtual pin for a snapshot value.
pub fn pin_text(value: SnapshotValue) -> String {
    match value {
        SnapshotValue::Number(v) => v.to_string(),
        SnapshotValue::Flag(true) => FLAG_ON.to_string(),
        SnapshotValue::Flag(false) => FLAG_OFF.to_string(),
    }
}

/// Writes mapped snapshot keys to dashboard virtual pins.
pub struct DashboardSink<C> {
    client: Arc<C>,
    pins: BTreeMap<String, u8>,
}

impl<C: DashboardClient> DashboardSink<C> {
    pub fn new(client: Arc<C>, pins: BTreeMap<String, u8>) -> Self {
        Self { client, pins }
    }
}

#[async_trait]
impl<C: DashboardClient> SnapshotSink for DashboardSink<C> {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut total = 0;
        let mut failed = 0;

        for entry in snapshot.entries() {
            let Some(&pin) = self.pins.get(&entry.key) else {
                continue;
            };
            total += 1;
            let text = pin_text(entry.value);
            if let Err(e) = self.client.virtual_write(pin, &text).await {
                failed += 1;
                debug!(key = %entry.key, pin, error = %e, "Virtual pin write failed");
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(SinkError::Partial { failed, total })
        }
    }
}

/// Poll a setpoint pin and forward operator changes as commands.
///
/// The first successful read only records the current value, so a restart
/// does not re-apply a stale setpoint. Returns when the command channel
/// closes.
pub async fn watch_setpoint_pin<C: DashboardClient>(
    client: Arc<C>,
    pin: u8,
    period: Duration,
    commands: mpsc::Sender<SetpointCommand>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<String> = None;

    info!(pin, period_secs = period.as_secs_f64(), "Watching dashboard setpoint pin");

    loop {
        ticker.tick().await;
        if commands.is_closed() {
            break;
        }

        let value = match client.read_virtual_pin(pin).await {
            Ok(value) => value,
            Err(e) => {
                warn!(pin, error = %e, "Failed to read setpoint pin");
                continue;
            }
        };

        match &last {
            None => debug!(pin, value = %value, "Setpoint pin baseline"),
            Some(previous) if *previous == value => {}
            Some(_) => {
                info!(pin, value = %value, "Setpoint pin changed");
                let command = SetpointCommand::new(CommandSource::Dashboard, value.clone());
                if commands.send(command).await.is_err() {
                    break;
                }
            }
        }
        last = Some(value);
    }
}

/// In-memory dashboard that records writes and serves scripted pin values.
#[derive(Debug, Clone, Default)]
pub struct MemoryDashboard {
    state: Arc<Mutex<MemoryDashboardState>>,
}

#[derive(Debug, Default)]
struct MemoryDashboardState {
    pins: BTreeMap<u8, String>,
    writes: Vec<(u8, String)>,
    offline: bool,
}

impl MemoryDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a pin as if the operator changed it.
    pub fn set_pin(&self, pin: u8, value: impl Into<String>) {
        self.state.lock().pins.insert(pin, value.into());
    }

    /// Make every request fail.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn writes(&self) -> Vec<(u8, String)> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl DashboardClient for MemoryDashboard {
    async fn virtual_write(&self, pin: u8, value: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(SinkError::Request("dashboard offline".to_string()));
        }
        state.writes.push((pin, value.to_string()));
        state.pins.insert(pin, value.to_string());
        Ok(())
    }

    async fn read_virtual_pin(&self, pin: u8) -> Result<String, SinkError> {
        let state = self.state.lock();
        if state.offline {
            return Err(SinkError::Request("dashboard offline".to_string()));
        }
        state
            .pins
            .get(&pin)
            .cloned()
            .ok_or_else(|| SinkError::Rejected(format!("pin V{pin} has no value")))
    }
}
