//! Log levels driven by configuration.
//!
//! [`ConfigLevelFilter`] is a per-layer filter: an event passes when its
//! level is at least the level configured for its target under the
//! `log-level` prefix. Targets map to config paths by turning `::` into
//! `.` and prepending the optional prefix, so `my_app::db` with prefix `svc`
//! reads `log-level.svc.my_app.db`, then its ancestors.

use tracing::level_filters::LevelFilter;
use tracing::subscriber::Interest;
use tracing::{Level, Metadata};
use tracing_subscriber::layer::{Context, Filter};

use crate::model::LogLevel;
use crate::resolver::Resolver;

/// Maps a tracing level onto the config scale.
pub fn log_level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Clone)]
pub struct ConfigLevelFilter {
    resolver: Resolver,
    prefix: Option<String>,
}

impl ConfigLevelFilter {
    pub fn new(resolver: Resolver, prefix: Option<String>) -> Self {
        Self {
            resolver,
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Config path for a tracing target, without the `log-level` prefix.
    pub fn path_for(&self, target: &str) -> String {
        let path = target.replace("::", ".");
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, path),
            None => path,
        }
    }

    /// Threshold configured for a target. An explicit NOT_SET counts as DEBUG.
    pub fn threshold_for(&self, target: &str) -> LogLevel {
        match self.resolver.log_level(&self.path_for(target)) {
            LogLevel::NotSetLogLevel => LogLevel::Debug,
            level => level,
        }
    }

    pub fn enabled_for(&self, target: &str, level: &Level) -> bool {
        log_level_of(level) >= self.threshold_for(target)
    }
}

impl<S> Filter<S> for ConfigLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        self.enabled_for(meta.target(), meta.level())
    }

    // Levels change at runtime, so no callsite may be cached.
    fn callsite_enabled(&self, _meta: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::TRACE)
    }
}
