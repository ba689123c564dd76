use thiserror::Error;

/// Errors raised by the shared DriveSight types.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid Zenoh or logging settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The Zenoh session could not be opened.
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// A telemetry payload could not be encoded or decoded as JSON.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A telemetry payload could not be encoded or decoded as CBOR.
    #[error("CBOR serialization error: {0}")]
    Cbor(String),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using DriveSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
