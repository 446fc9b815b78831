//! Process-wide logging setup.
//!
//! Call sites use the `log` macros; [`init_logging`] bridges them into a
//! `tracing` subscriber with a fmt layer. Without a config filter the layer
//! is filtered by `FLAGSYNC_LOG` (an `EnvFilter` directive, default `info`).

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::log_level::ConfigLevelFilter;

pub const LOG_ENV: &str = "FLAGSYNC_LOG";

static INIT: OnceLock<bool> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber and the `log` bridge.
///
/// Safe to call more than once; only the first call does anything. Returns
/// whether this process's subscriber is the one installed here. Never fails:
/// if another subscriber is already set, that one stays.
pub fn init_logging(config_filter: Option<ConfigLevelFilter>) -> bool {
    *INIT.get_or_init(|| {
        let (dynamic, fixed) = match config_filter {
            Some(filter) => (Some(fmt::layer().with_target(true).with_filter(filter)), None),
            None => (None, Some(fmt::layer().with_target(true).with_filter(env_filter()))),
        };
        let subscriber = tracing_subscriber::registry().with(dynamic).with(fixed);

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return false;
        }
        // A `log` logger installed elsewhere keeps receiving `log` records.
        let _ = tracing_log::LogTracer::init();
        true
    })
}
