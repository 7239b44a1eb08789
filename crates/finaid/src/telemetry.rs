use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log filter '{directive}' is not a valid level or directive list")]
    Filter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("global subscriber already installed: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Filter used when `RUST_LOG` is absent: the configured level for every target.
pub fn filter_from_level(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|source| TelemetryError::Filter {
        directive: directive.to_string(),
        source,
    })
}

/// Installs the global subscriber. `RUST_LOG` wins over `APP_LOG_LEVEL`.
///
/// Targets and thread ids stay in the output so per-record contention can be traced.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| filter_from_level(&config.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_levels_and_directives() {
        assert!(filter_from_level("info").is_ok());
        assert!(filter_from_level("warn,finaid=debug").is_ok());
    }

    #[test]
    fn rejects_malformed_directives() {
        let err = filter_from_level("finaid=loud").expect_err("invalid level");
        assert!(err.to_string().contains("finaid=loud"));
    }
}
