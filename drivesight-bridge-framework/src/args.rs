//! CLI arguments shared by bridges.

use std::path::{Path, PathBuf};

use clap::Args;
use drivesight_common::{LoggingConfig, init_tracing};

use crate::error::{BridgeError, Result};

/// Common CLI arguments for all bridges.
///
/// Meant to be `#[command(flatten)]`-ed into a bridge's own parser.
#[derive(Args, Debug, Clone, Default)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// The configured path, or `default` when `--config` was not given.
    pub fn config_or(&self, default: impl AsRef<Path>) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| default.as_ref().to_path_buf())
    }
}

/// Initialize tracing from the config, honoring `--log-level`.
pub fn init_logging(logging: &LoggingConfig, args: &BridgeArgs) -> Result<()> {
    let effective = logging.with_level_override(args.log_level.as_deref());
    init_tracing(&effective).map_err(|e| BridgeError::Logging(e.to_string()))
}
