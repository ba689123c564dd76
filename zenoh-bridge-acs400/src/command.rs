//! Inbound setpoint commands.
//!
//! Commands reach the poll loop through an mpsc channel so that the loop
//! stays the only user of the serial link.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use zenoh::sample::SampleKind;

/// Command name for pressure reference writes.
pub const PRESSURE_REFERENCE_COMMAND: &str = "pressure_reference";

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Zenoh,
    Dashboard,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSource::Zenoh => write!(f, "zenoh"),
            CommandSource::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// A pressure reference request, still as received text.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointCommand {
    pub source: CommandSource,
    pub value: String,
}

impl SetpointCommand {
    pub fn new(source: CommandSource, value: impl Into<String>) -> Self {
        Self {
            source,
            value: value.into(),
        }
    }
}

/// Forward samples put on `key` as setpoint commands.
///
/// Returns when the command channel or the subscriber closes.
pub async fn subscribe_setpoints(
    session: Arc<zenoh::Session>,
    key: String,
    commands: mpsc::Sender<SetpointCommand>,
) -> Result<(), zenoh::Error> {
    let subscriber = session.declare_subscriber(&key).await?;
    info!(key = %key, "Listening for pressure reference commands");

    while let Ok(sample) = subscriber.recv_async().await {
        if sample.kind() == SampleKind::Delete {
            continue;
        }
        let payload = sample.payload().to_bytes();
        let value = String::from_utf8_lossy(&payload).trim().to_string();
        debug!(key = %sample.key_expr(), value = %value, "Setpoint command received");

        if commands
            .send(SetpointCommand::new(CommandSource::Zenoh, value))
            .await
            .is_err()
        {
            break;
        }
    }

    Ok(())
}
