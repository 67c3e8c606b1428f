//! Tracing subscriber setup for hosts that have none

use tracing_subscriber::EnvFilter;

/// Subscriber could not be installed
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Filter directive did not parse
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber is already set
    #[error("could not install subscriber: {0}")]
    Install(String),
}

/// Install a fmt subscriber
///
/// `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
/// `TelemetryError::Filter` for a bad directive, `TelemetryError::Install`
/// if a global subscriber already exists
pub fn init(default_filter: &str) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_fails_cleanly() {
        let first = init("dh_engine=debug");
        let second = init("dh_engine=debug");
        assert!(first.is_ok() || matches!(first, Err(TelemetryError::Install(_))));
        assert!(matches!(second, Err(TelemetryError::Install(_))));
    }
}
