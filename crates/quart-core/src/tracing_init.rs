//! Shared tracing/logging initialization.
//!
//! Logs go to stderr so that `quart receive` can print a received message or
//! key on stdout without interleaving.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor a configured level is given.
pub const DEFAULT_FILTER: &str = "quart=info,quart_session=info,quart_core=info";

/// Build the filter string for a configured level such as `"debug"`,
/// scoped to the Quart crates.
pub fn filter_for_level(level: &str) -> String {
    ["quart", "quart_cli", "quart_session", "quart_crypto", "quart_core"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. [`DEFAULT_FILTER`]).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_covers_every_crate() {
        let filter = filter_for_level("debug");
        assert!(filter.starts_with("quart=debug"));
        assert!(filter.contains("quart_session=debug"));
        assert!(filter.ends_with("quart_core=debug"));
    }
}
