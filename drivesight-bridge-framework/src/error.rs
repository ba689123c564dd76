//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised while loading, starting or running a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is not valid JSON5 for the bridge's config type.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but failed the bridge's checks.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Tracing could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// The Zenoh session could not be opened.
    #[error("Zenoh connection error: {0}")]
    ZenohConnection(String),

    /// A payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A put to Zenoh failed.
    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },
}

impl BridgeError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        let err = BridgeError::validation("unit_id must be 1-247");
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: unit_id must be 1-247"
        );

        let err = BridgeError::Publish {
            key: "drivesight/acs400/speed".to_string(),
            message: "session closed".to_string(),
        };
        assert!(err.to_string().contains("drivesight/acs400/speed"));
    }
}
