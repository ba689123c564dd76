//! DriveSight Bridge Framework
//!
//! Common abstractions for bridges that publish drive telemetry to Zenoh.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (Zenoh session, workers, Ctrl+C)
//! - [`Publisher`] for publishing telemetry to Zenoh with automatic serialization
//! - [`BridgeArgs`] for common CLI arguments
//! - [`BridgeStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use drivesight_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, init_logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse();
//!     let config = MyBridgeConfig::load(args.config_or("mybridge.json5"))?;
//!     init_logging(config.logging(), &args)?;
//!
//!     let mut runner = BridgeRunner::new("mybridge", config).await?;
//!     let publisher = runner.publisher();
//!     runner.spawn(my_worker(publisher));
//!
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod publisher;
mod runner;
mod status;

pub use args::{BridgeArgs, init_logging};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use publisher::{PublishStats, Publisher};
pub use runner::BridgeRunner;
pub use status::{BridgeStatus, StatusPublisher};

// Re-export commonly used types from drivesight-common
pub use drivesight_common::{
    Format, KeyExprBuilder, LoggingConfig, TelemetryPoint, TelemetryValue, ZenohConfig,
};
