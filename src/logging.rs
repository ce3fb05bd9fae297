//! Logging setup shared by the binary and the tests

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter {0}: {1}")]
    InvalidFilter(String, String),
}

/// Install a global subscriber logging at `level`.
///
/// `RUST_LOG` overrides `level` when set. Returns `false` when a subscriber
/// was already installed, in which case nothing changes.
pub fn init_logging(level: &str) -> Result<bool, LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| LoggingError::InvalidFilter(level.to_string(), e.to_string()))?,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init_logging("info");
        assert!(!init_logging("debug").unwrap());
    }
}
