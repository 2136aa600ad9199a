//! Tracing bootstrap for binaries and tests embedding the orchestrator.
//!
//! `RUST_LOG` wins when set; otherwise `default_directive` applies.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;

/// Output layout of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing_with(default_directive: &str, format: LogFormat) -> Result<(), TryInitError> {
    use tracing_subscriber::util::SubscriberInitExt;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.finish().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).finish().try_init(),
    }
}

/// Human-readable logging, e.g. `init_tracing("info,vgen_foundation=debug")`.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    init_tracing_with(default_directive, LogFormat::Pretty)
}

/// Like [`init_tracing`] but ignores an already installed subscriber, so
/// every test can call it.
pub fn try_init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_test_writer()
        .try_init();
}
