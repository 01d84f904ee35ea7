//! Logging initialization.
//!
//! Structured logging via the `tracing` ecosystem. The level comes from
//! the config file, overridable per invocation with `--verbose` and the
//! `RUST_LOG` environment variable; output goes to stderr so stdout stays
//! reserved for command output.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vignette_core::config::LoggingConfig;

/// Initialize the logging subsystem from config plus CLI overrides.
pub fn init(config: &LoggingConfig, verbose: bool, json_logs: bool) {
    let level = if verbose { "debug" } else { &config.level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = json_logs || config.format == "json";
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}
