//! Tracing subscriber setup for the HTTP binary.
//!
//! `RUST_LOG` selects the filter (default: `info`); `LogFormat::Json`
//! switches to one JSON object per line for log shippers.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_tracing(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);

    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_tracing(LogFormat::Text);
        assert!(!init_tracing(LogFormat::Json));
    }
}
