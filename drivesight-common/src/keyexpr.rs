//! Key expression layout for drive telemetry.
//!
//! ```text
//! drivesight/<device>/<metric>                 telemetry
//! drivesight/<device>/@/commands/<command>     inbound commands
//! drivesight/@/status                          bridge status
//! ```

/// Default key expression prefix for all DriveSight telemetry.
pub const KEY_PREFIX: &str = "drivesight";

/// Builder for DriveSight key expressions under a prefix.
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix. Trailing slashes are dropped.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// The prefix this builder appends to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a key expression for a device metric.
    ///
    /// # Example
    /// ```
    /// use drivesight_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("drivesight");
    /// assert_eq!(builder.metric("acs400", "speed"), "drivesight/acs400/speed");
    /// ```
    pub fn metric(&self, device: &str, metric: &str) -> String {
        format!("{}/{}/{}", self.prefix, device, metric)
    }

    /// Build the key expression a device listens on for a command.
    ///
    /// # Example
    /// ```
    /// use drivesight_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("drivesight");
    /// assert_eq!(
    ///     builder.command("acs400", "pressure_reference"),
    ///     "drivesight/acs400/@/commands/pressure_reference"
    /// );
    /// ```
    pub fn command(&self, device: &str, command: &str) -> String {
        format!("{}/{}/@/commands/{}", self.prefix, device, command)
    }

    /// Wildcard for every metric of one device.
    pub fn device_wildcard(&self, device: &str) -> String {
        format!("{}/{}/**", self.prefix, device)
    }

    /// Key expression for bridge status.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }
}
