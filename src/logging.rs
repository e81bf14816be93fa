//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{LatticeError, LatticeResult};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber for `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> LatticeResult<()> {
    let format = match config.format.as_str() {
        "" => "pretty",
        other => other,
    };
    if !matches!(format, "pretty" | "compact" | "json") {
        return Err(LatticeError::config(format!(
            "Unknown log format '{}' (expected pretty, compact or json)",
            config.format
        )));
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            LatticeError::config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| LatticeError::Logging(e.to_string()))
}
