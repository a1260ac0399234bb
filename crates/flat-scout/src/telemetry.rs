use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Dependencies that are chatty at `debug` and rarely useful when tracing a cycle.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "h2=warn", "rusqlite=warn"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{value}'")
            }
            TelemetryError::Subscriber(err) => write!(f, "could not install subscriber: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for_level(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(config.ansi)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Filter for the configured level with noisy dependencies capped at `warn`.
pub fn filter_for_level(level: &str) -> Result<EnvFilter, TelemetryError> {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| target.to_string()));
    let joined = directives.join(",");

    EnvFilter::try_new(&joined).map_err(|source| TelemetryError::EnvFilter {
        value: level.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_combined_with_quiet_targets() {
        let filter = filter_for_level("debug").expect("valid level");
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("rusqlite=warn"));
    }

    #[test]
    fn module_directives_are_accepted() {
        assert!(filter_for_level("flat_scout=trace").is_ok());
    }

    #[test]
    fn malformed_filter_is_reported() {
        match filter_for_level("flat_scout=loud") {
            Err(TelemetryError::EnvFilter { value, .. }) => assert_eq!(value, "flat_scout=loud"),
            other => panic!("expected filter error, got {other:?}"),
        }
    }
}
