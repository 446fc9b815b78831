//! Client-side engine for remotely managed configuration and feature flags.
//!
//! Records arrive from static YAML files and from remote sources (an edge
//! snapshot, an API snapshot and a live delta stream). They are layered in a
//! versioned [`ConfigStore`] and resolved per caller [`Context`] through
//! criteria matching, weighted bucketing and hierarchical log levels.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod hierarchy;
pub mod log_level;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod weighted;

pub use client::{ClientBuilder, ConfigClient};
pub use config::{
    Datasources, OnInitializationFailure, OnNoDefault, Options, OptionsBuilder, StaticConfigLoader,
};
pub use context::{Context, ContextValue};
pub use error::{ClientError, FlagSyncError, LoadError, OptionsError, Result};
pub use gate::ReadinessGate;
pub use log_level::ConfigLevelFilter;
pub use logging::init_logging;
pub use model::{
    ConditionalRow, ConfigBatch, ConfigKind, ConfigRecord, ConfigValue, Criterion, LogLevel,
    Operator, Origin,
};
pub use resolver::Resolver;
pub use store::{ApplyOutcome, ConfigMap, ConfigStore};
pub use sync::{SourceError, SourceSynchronizer, SyncState};
pub use weighted::WeightedValueResolver;
