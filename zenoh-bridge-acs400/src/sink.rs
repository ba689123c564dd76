//! Snapshot consumers.

use std::sync::Arc;

use async_trait::async_trait;
use drivesight_bridge_framework::{Publisher, TelemetryPoint};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::snapshot::Snapshot;

/// Failure to deliver a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    #[error("{failed} of {total} values not delivered")]
    Partial { failed: usize, total: usize },
    #[error("request failed: {0}")]
    Request(String),
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Something that receives every non-empty snapshot.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError>;
}

/// Hand `snapshot` to every sink.
///
/// A failing sink is logged and skipped. Returns the number of sinks that
/// accepted the snapshot.
pub async fn publish_to_all(sinks: &[Arc<dyn SnapshotSink>], snapshot: &Snapshot) -> usize {
    let mut delivered = 0;
    for sink in sinks {
        match sink.publish(snapshot).await {
            Ok(()) => {
                delivered += 1;
                debug!(sink = sink.name(), values = snapshot.len(), "Snapshot delivered");
            }
            Err(e) => warn!(sink = sink.name(), error = %e, "Sink failed"),
        }
    }
    delivered
}

/// Publishes each snapshot entry as a [`TelemetryPoint`] at
/// `<key_prefix>/<device>/<key>`.
pub struct ZenohSink {
    publisher: Publisher,
    device: String,
}

impl ZenohSink {
    pub fn new(publisher: Publisher, device: impl Into<String>) -> Self {
        Self {
            publisher,
            device: device.into(),
        }
    }

    /// Telemetry points for a snapshot.
    pub fn points(device: &str, snapshot: &Snapshot) -> Vec<TelemetryPoint> {
        snapshot
            .entries()
            .iter()
            .map(|entry| {
                let mut point = TelemetryPoint::new(device, &entry.key, entry.value.into())
                    .at(snapshot.timestamp);
                if let Some(unit) = &entry.unit {
                    point = point.with_unit(unit);
                }
                if let Some(address) = entry.address {
                    point = point.with_label("address", format!("{:04}", address));
                }
                point
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotSink for ZenohSink {
    fn name(&self) -> &str {
        "zenoh"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let points = Self::points(&self.device, snapshot);
        let stats = self.publisher.publish_batch(&points).await;
        if stats.is_complete() {
            Ok(())
        } else {
            Err(SinkError::Partial {
                failed: stats.failed,
                total: stats.total(),
            })
        }
    }
}

/// Keeps every snapshot it receives. Optionally fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    received: Arc<Mutex<Vec<Snapshot>>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every snapshot (after recording it).
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<Snapshot> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        self.received.lock().push(snapshot.clone());
        if self.failing {
            return Err(SinkError::Request("sink unavailable".to_string()));
        }
        Ok(())
    }
}
