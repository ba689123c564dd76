//! Telemetry publisher for Zenoh.

use std::sync::Arc;

use drivesight_common::{Format, KeyExprBuilder, TelemetryPoint, encode};

use crate::error::{BridgeError, Result};

/// Publisher for sending telemetry to Zenoh.
///
/// Wraps a Zenoh session and publishes [`TelemetryPoint`] values under
/// `<prefix>/<source>/<metric>` with automatic serialization.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(
        session: Arc<zenoh::Session>,
        key_prefix: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            session,
            keys: KeyExprBuilder::new(key_prefix),
            format,
        }
    }

    /// Get the key prefix.
    pub fn key_prefix(&self) -> &str {
        self.keys.prefix()
    }

    /// Get the key expression builder.
    pub fn keys(&self) -> &KeyExprBuilder {
        &self.keys
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Publish a telemetry point at `<prefix>/<point.source>/<point.metric>`.
    pub async fn publish(&self, point: &TelemetryPoint) -> Result<()> {
        let key = self.keys.metric(&point.source, &point.metric);
        let payload =
            encode(point, self.format).map_err(|e| BridgeError::Serialization(e.to_string()))?;

        self.publish_raw(&key, payload).await
    }

    /// Publish a batch of telemetry points.
    ///
    /// Every point is attempted; failures are logged and counted.
    pub async fn publish_batch<'a, I>(&self, points: I) -> PublishStats
    where
        I: IntoIterator<Item = &'a TelemetryPoint>,
    {
        let mut stats = PublishStats::default();

        for point in points {
            match self.publish(point).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(metric = %point.metric, error = %e, "Failed to publish telemetry");
                }
            }
        }

        stats
    }

    /// Publish raw bytes to a full key.
    pub async fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// Publish a JSON value to a full key.
    pub async fn publish_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(key, payload).await
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published points.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Whether every attempted publish succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}
