//! Log output for the admin process. The level filter sits behind a reload
//! layer so a level read from the config file can replace the startup one.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Level used until the configuration has been read.
pub const STARTUP_LEVEL: &str = "info";

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn operator_override() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

fn filter_for(level: &str) -> EnvFilter {
    if operator_override() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(STARTUP_LEVEL))
}

pub fn init_tracing() {
    init_tracing_with_level(STARTUP_LEVEL);
}

/// Installs the global subscriber. Later calls leave the first one in place.
pub fn init_tracing_with_level(level: &str) {
    let (filter, handle) = reload::Layer::new(filter_for(level));
    if FILTER.set(handle).is_err() {
        return;
    }
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Swaps in `level` for the running subscriber. Returns false when nothing
/// changed: no subscriber yet, or `RUST_LOG` pins the filter.
pub fn apply_logging_level(level: &str) -> bool {
    if operator_override() {
        return false;
    }
    match FILTER.get() {
        Some(handle) => handle
            .modify(|current| *current = filter_for(level))
            .is_ok(),
        None => false,
    }
}
