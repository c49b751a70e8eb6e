//! Observability.
//!
//! The engine emits structured `tracing` events only; this module wires a
//! subscriber for embedders that do not install their own.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// Filter directives come from `MATFED_LOG` (falling back to `RUST_LOG`,
/// then `info`). Safe to call more than once; only the first call installs
/// a subscriber. Embedders with their own subscriber should simply not call
/// this.
pub fn init_logging(format: LogFormat) {
    LOGGING_INIT.get_or_init(|| {
        let filter = std::env::var("MATFED_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map_or_else(
                |_| EnvFilter::new("info"),
                |directives| EnvFilter::new(directives),
            );

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        // try_init: losing the race to an embedder's subscriber is fine.
        let result = match format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        if let Err(err) = result {
            tracing::debug!("logging subscriber already installed: {err}");
        }
    });
}
