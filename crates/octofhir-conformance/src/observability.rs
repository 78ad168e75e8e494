//! Log output for harness runs.
//!
//! Steps, HTTP round trips and sequence summaries are emitted as `tracing`
//! events; this module installs the subscriber that prints them.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

/// Install the global subscriber filtered at `level`.
///
/// A `RUST_LOG` directive in the environment takes precedence over `level`.
/// Only the first call installs anything.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter_layer, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false))
        .try_init();
}

pub fn init_from_config(logging: &LoggingConfig) {
    init_tracing(&logging.level);
}

/// Switch an installed subscriber to `level`, e.g. `debug` while one
/// sequence is investigated.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = FILTER.get() {
        let _ = handle.reload(EnvFilter::new(level));
    }
}
