//! Turns a key and a context into a concrete value.
//!
//! Lookup reads the merged view of the store, lets the criteria matcher pick
//! a row, then unwraps the row's value: weighted-value sets are bucketed for
//! the caller's identity, recursively, until a plain value remains.

use std::sync::Arc;

use crate::context::Context;
use crate::hierarchy::resolve_most_specific;
use crate::matcher::CriteriaMatcher;
use crate::model::{ConfigValue, LogLevel};
use crate::store::{ConfigMap, ConfigStore};
use crate::weighted::WeightedValueResolver;

/// Reserved prefix for hierarchical log levels.
pub const LOG_LEVEL_BASE_KEY: &str = "log-level";

/// Severity used when no log-level key applies.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warn;

#[derive(Clone)]
pub struct Resolver {
    store: Arc<ConfigStore>,
}

impl Resolver {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Resolves `key` for `context`. `None` when the key is unknown or no row
    /// matches.
    pub fn get(&self, key: &str, context: &Context) -> Option<ConfigValue> {
        let (configs, env) = self.store.view();
        resolve_in(&configs, env, key, context)
    }

    /// Effective level for a dotted path under [`LOG_LEVEL_BASE_KEY`].
    pub fn log_level(&self, path: &str) -> LogLevel {
        self.log_level_or(path, DEFAULT_LOG_LEVEL)
    }

    pub fn log_level_or(&self, path: &str, default: LogLevel) -> LogLevel {
        let (configs, env) = self.store.view();
        let context = Context::new();
        resolve_most_specific(LOG_LEVEL_BASE_KEY, path, default, |key| {
            resolve_in(&configs, env, key, &context).and_then(|v| v.as_log_level())
        })
    }
}

/// Resolves a key against an already-taken view of the store.
pub fn resolve_in(
    configs: &ConfigMap,
    project_env_id: Option<i64>,
    key: &str,
    context: &Context,
) -> Option<ConfigValue> {
    let record = configs.get(key)?;
    let row = CriteriaMatcher::new(configs, project_env_id).first_match(&record.rows, context)?;
    unwrap_value(&row.value, key, context)
}

/// Reduces weighted-value sets to the variant selected for the context's
/// lookup key. Other values pass through unchanged.
pub fn unwrap_value(value: &ConfigValue, key: &str, context: &Context) -> Option<ConfigValue> {
    match value {
        ConfigValue::WeightedValues(set) => {
            let selected =
                WeightedValueResolver::new(&set.weighted_values, key, context.lookup_key.as_deref())
                    .resolve()?;
            unwrap_value(selected, key, context)
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ConditionalRow, ConfigBatch, ConfigRecord, ConfigServicePointer, Criterion, Operator,
        Origin,
    };
    use std::collections::HashMap;

    fn store_with(records: Vec<ConfigRecord>) -> Arc<ConfigStore> {
        let defaults = records.into_iter().map(|r| (r.key.clone(), r)).collect();
        Arc::new(ConfigStore::new(defaults, HashMap::new()))
    }

    #[test]
    fn test_plain_value() {
        let resolver = Resolver::new(store_with(vec![ConfigRecord::with_value(
            "greeting",
            0,
            "hello".into(),
        )]));
        assert_eq!(resolver.get("greeting", &Context::new()), Some("hello".into()));
        assert_eq!(resolver.get("missing", &Context::new()), None);
    }

    #[test]
    fn test_no_matching_row_is_no_value() {
        let record = ConfigRecord::new("gated", 1, Default::default()).push_row(ConditionalRow::new(
            vec![Criterion::new("env", Operator::PropIsOneOf, "prod")],
            true.into(),
        ));
        let resolver = Resolver::new(store_with(vec![record]));
        assert_eq!(resolver.get("gated", &Context::new().with_property("env", "dev")), None);
        assert_eq!(
            resolver.get("gated", &Context::new().with_property("env", "prod")),
            Some(true.into())
        );
    }

    #[test]
    fn test_weighted_row_is_bucketed_by_lookup_key() {
        let weighted = ConfigValue::weighted(vec![
            ("abc".into(), 1),
            ("def".into(), 98),
            ("ghi".into(), 1),
        ]);
        let resolver = Resolver::new(store_with(vec![ConfigRecord::with_value(
            "config_key",
            0,
            weighted,
        )]));

        let pick = |user: &str| resolver.get("config_key", &Context::new().with_lookup_key(user));
        assert_eq!(pick("user:456"), Some("def".into()));
        assert_eq!(pick("user:103"), Some("ghi".into()));
        assert_eq!(pick("user:119"), Some("abc".into()));
    }

    #[test]
    fn test_nested_weighted_values_unwrap_fully() {
        let inner = ConfigValue::weighted(vec![("only".into(), 5)]);
        let outer = ConfigValue::weighted(vec![(inner, 1)]);
        let resolver = Resolver::new(store_with(vec![ConfigRecord::with_value("k", 0, outer)]));
        assert_eq!(resolver.get("k", &Context::new()), Some("only".into()));
    }

    #[test]
    fn test_log_level_walk() {
        let resolver = Resolver::new(store_with(vec![
            ConfigRecord::with_value("log-level", 0, LogLevel::Warn.into()),
            ConfigRecord::with_value("log-level.app.module", 0, LogLevel::Debug.into()),
        ]));
        assert_eq!(resolver.log_level("app.module.func"), LogLevel::Debug);
        assert_eq!(resolver.log_level("app.other.func"), LogLevel::Warn);
    }

    #[test]
    fn test_log_level_default_and_dynamic_update() {
        let store = store_with(vec![]);
        let resolver = Resolver::new(Arc::clone(&store));
        assert_eq!(resolver.log_level("app.x"), DEFAULT_LOG_LEVEL);
        assert_eq!(resolver.log_level_or("app.x", LogLevel::Info), LogLevel::Info);

        store.apply(
            ConfigRecord::with_value("log-level.app", 3, LogLevel::Error.into()),
            Origin::Stream,
        );
        assert_eq!(resolver.log_level("app.x"), LogLevel::Error);
    }

    fn env_batch(id: i64) -> ConfigBatch {
        let env = id % 2 + 1;
        let record = ConfigRecord::new("k", id, Default::default())
            .push_row(ConditionalRow::always("scoped".into()).in_env(env));
        ConfigBatch::new(vec![record]).with_pointer(ConfigServicePointer {
            project_id: 1,
            start_at_id: id,
            project_env_id: env,
        })
    }

    #[test]
    fn test_environment_and_records_are_read_together() {
        let store = store_with(vec![]);
        store.apply_batch(env_batch(1), Origin::Stream);
        let resolver = Resolver::new(Arc::clone(&store));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for id in 2..=500 {
                    store.apply_batch(env_batch(id), Origin::Stream);
                }
            })
        };

        // Each batch scopes its only row to its own environment, so a view
        // pairing one batch's records with another's environment resolves
        // to nothing.
        for _ in 0..500 {
            assert_eq!(resolver.get("k", &Context::new()), Some("scoped".into()));
        }
        writer.join().unwrap();
    }
}
