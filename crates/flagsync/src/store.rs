//! Layered configuration store.
//!
//! Three layers are merged into one lookup map, highest precedence first:
//! static overrides, dynamic records (snapshots and stream), static defaults.
//! A key in a higher layer shadows the whole record of a lower layer.
//!
//! Only the dynamic layer changes after construction. A dynamic record must
//! carry a strictly greater `id` than whatever the store already holds for
//! its key (live record or tombstone), otherwise it is ignored.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::model::{ConfigBatch, ConfigRecord, Origin};

/// The merged lookup map handed to readers.
pub type ConfigMap = HashMap<String, ConfigRecord>;

/// A dynamic record together with where and when it arrived.
#[derive(Debug, Clone)]
pub struct DynamicEntry {
    pub record: ConfigRecord,
    pub origin: Origin,
    pub applied_at: DateTime<Utc>,
}

/// Summary of one `apply_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub ignored: usize,
    pub starting_highwater: i64,
    pub highwater: i64,
}

impl ApplyOutcome {
    pub fn advanced(&self) -> bool {
        self.highwater > self.starting_highwater
    }
}

enum Decision {
    Stale { current: i64 },
    Inserted,
    Replaced { previous: i64 },
    Deleted,
    TombstoneRecorded,
}

struct StoreInner {
    defaults: ConfigMap,
    overrides: ConfigMap,
    dynamic: HashMap<String, DynamicEntry>,
    /// Versions of deleted keys, so late stale records stay rejected.
    tombstones: HashMap<String, i64>,
    merged: Arc<ConfigMap>,
    highwater_mark: i64,
    project_env_id: Option<i64>,
}

impl StoreInner {
    fn current_version(&self, key: &str) -> Option<i64> {
        let live = self.dynamic.get(key).map(|e| e.record.id);
        let dead = self.tombstones.get(key).copied();
        live.max(dead)
    }

    fn decide(&mut self, record: ConfigRecord, origin: Origin) -> Decision {
        if let Some(current) = self.current_version(&record.key) {
            if record.id <= current {
                return Decision::Stale { current };
            }
        }

        self.highwater_mark = self.highwater_mark.max(record.id);

        if record.is_tombstone() {
            self.tombstones.insert(record.key.clone(), record.id);
            return match self.dynamic.remove(&record.key) {
                Some(_) => Decision::Deleted,
                None => Decision::TombstoneRecorded,
            };
        }

        self.tombstones.remove(&record.key);
        let entry = DynamicEntry {
            record,
            origin,
            applied_at: Utc::now(),
        };
        match self.dynamic.insert(entry.record.key.clone(), entry) {
            Some(previous) => Decision::Replaced {
                previous: previous.record.id,
            },
            None => Decision::Inserted,
        }
    }

    fn recompute(&mut self) {
        let mut merged = self.defaults.clone();
        merged.extend(
            self.dynamic
                .iter()
                .map(|(key, entry)| (key.clone(), entry.record.clone())),
        );
        merged.extend(self.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.merged = Arc::new(merged);
    }
}

/// Thread-safe layered store. `apply` calls are serialized against each other
/// and against `snapshot` reads.
pub struct ConfigStore {
    inner: RwLock<StoreInner>,
}

impl ConfigStore {
    /// Creates a store from the two static layers. They never change afterwards.
    pub fn new(defaults: ConfigMap, overrides: ConfigMap) -> Self {
        let mut inner = StoreInner {
            defaults,
            overrides,
            dynamic: HashMap::new(),
            tombstones: HashMap::new(),
            merged: Arc::new(HashMap::new()),
            highwater_mark: 0,
            project_env_id: None,
        };
        inner.recompute();
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// A store with no static layers.
    pub fn empty() -> Self {
        Self::new(HashMap::new(), HashMap::new())
    }

    /// Applies one dynamic record. Returns whether it was accepted.
    pub fn apply(&self, record: ConfigRecord, origin: Origin) -> bool {
        self.apply_batch(ConfigBatch::new(vec![record]), origin).applied == 1
    }

    /// Applies every record of a batch under a single write lock, so readers
    /// see either none or all of the batch.
    ///
    /// Static origins are rejected whole: the static layers are fixed at
    /// construction.
    pub fn apply_batch(&self, batch: ConfigBatch, origin: Origin) -> ApplyOutcome {
        if !origin.is_dynamic() {
            let highwater = self.highwater_mark();
            warn!(
                "Rejecting batch of {} records from {}: not a dynamic source",
                batch.configs.len(),
                origin
            );
            return ApplyOutcome {
                applied: 0,
                ignored: batch.configs.len(),
                starting_highwater: highwater,
                highwater,
            };
        }

        let mut notes = Vec::with_capacity(batch.configs.len());
        let outcome = {
            let mut inner = self.write();
            let starting_highwater = inner.highwater_mark;
            let mut applied = 0;
            let mut ignored = 0;

            if let Some(pointer) = batch.config_service_pointer {
                inner.project_env_id = Some(pointer.project_env_id);
            }

            for record in batch.configs {
                let key = record.key.clone();
                let id = record.id;
                let decision = inner.decide(record, origin);
                match decision {
                    Decision::Stale { .. } => ignored += 1,
                    _ => applied += 1,
                }
                notes.push((key, id, decision));
            }

            if applied > 0 {
                inner.recompute();
            }

            ApplyOutcome {
                applied,
                ignored,
                starting_highwater,
                highwater: inner.highwater_mark,
            }
        };

        // Logged after the lock is dropped: the config-driven level filter
        // reads this store from inside the logging path.
        for (key, id, decision) in notes {
            match decision {
                Decision::Stale { current } => debug!(
                    "Ignoring stale record {} from {}: version {} <= {}",
                    key, origin, id, current
                ),
                Decision::Replaced { previous } => debug!(
                    "Replace {} with value from {} {} -> {}",
                    key, origin, previous, id
                ),
                Decision::Deleted => info!("Deleted {} via tombstone {} from {}", key, id, origin),
                Decision::Inserted | Decision::TombstoneRecorded => {}
            }
        }

        outcome
    }

    /// The merged view. Cheap to call; the map is shared until the next apply.
    pub fn snapshot(&self) -> Arc<ConfigMap> {
        Arc::clone(&self.read().merged)
    }

    /// The merged view together with the active environment, read under one
    /// lock so a concurrent batch cannot split them.
    pub fn view(&self) -> (Arc<ConfigMap>, Option<i64>) {
        let inner = self.read();
        (Arc::clone(&inner.merged), inner.project_env_id)
    }

    /// Looks up a single key in the merged view.
    pub fn get(&self, key: &str) -> Option<ConfigRecord> {
        self.read().merged.get(key).cloned()
    }

    /// Records currently held by the dynamic layer, in no particular order.
    pub fn api_deltas(&self) -> Vec<ConfigRecord> {
        self.read()
            .dynamic
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// When the dynamic record currently held for `key` was applied.
    pub fn applied_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read().dynamic.get(key).map(|entry| entry.applied_at)
    }

    pub fn highwater_mark(&self) -> i64 {
        self.read().highwater_mark
    }

    /// Environment reported by the most recent batch pointer.
    pub fn project_env_id(&self) -> Option<i64> {
        self.read().project_env_id
    }

    /// Which layer currently serves `key`.
    pub fn origin_of(&self, key: &str) -> Option<Origin> {
        let inner = self.read();
        if inner.overrides.contains_key(key) {
            Some(Origin::StaticOverride)
        } else if let Some(entry) = inner.dynamic.get(key) {
            Some(entry.origin)
        } else if inner.defaults.contains_key(key) {
            Some(Origin::StaticDefault)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.read().merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigServicePointer, ConfigValue};

    fn record(key: &str, id: i64, value: &str) -> ConfigRecord {
        ConfigRecord::with_value(key, id, ConfigValue::from(value))
    }

    fn tombstone(key: &str, id: i64) -> ConfigRecord {
        ConfigRecord::new(key, id, Default::default())
    }

    fn value_of(store: &ConfigStore, key: &str) -> Option<ConfigValue> {
        store.get(key).map(|r| r.rows[0].value.clone())
    }

    #[test]
    fn test_newer_version_replaces() {
        let store = ConfigStore::empty();
        assert!(store.apply(record("a", 1, "one"), Origin::SnapshotApi));
        assert!(store.apply(record("a", 2, "two"), Origin::Stream));
        assert_eq!(value_of(&store, "a"), Some("two".into()));
        assert_eq!(store.origin_of("a"), Some(Origin::Stream));
        assert_eq!(store.highwater_mark(), 2);
    }

    #[test]
    fn test_equal_or_older_version_is_ignored() {
        let store = ConfigStore::empty();
        store.apply(record("a", 5, "five"), Origin::Stream);

        assert!(!store.apply(record("a", 5, "dup"), Origin::SnapshotApi));
        assert!(!store.apply(record("a", 3, "old"), Origin::SnapshotApi));
        assert_eq!(value_of(&store, "a"), Some("five".into()));
        assert_eq!(store.highwater_mark(), 5);
    }

    #[test]
    fn test_same_record_twice_is_noop() {
        let store = ConfigStore::empty();
        let first = store.apply_batch(ConfigBatch::new(vec![record("a", 7, "x")]), Origin::Stream);
        let before = store.snapshot();
        let second = store.apply_batch(ConfigBatch::new(vec![record("a", 7, "x")]), Origin::Stream);

        assert_eq!(first.applied, 1);
        assert_eq!(second.applied, 0);
        assert_eq!(second.ignored, 1);
        assert!(!second.advanced());
        // No recompute happened, so readers keep the very same map.
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_tombstone_deletes_and_blocks_stale_resurrection() {
        let store = ConfigStore::empty();
        store.apply(record("a", 1, "one"), Origin::SnapshotApi);
        assert!(store.apply(tombstone("a", 2), Origin::Stream));
        assert!(store.get("a").is_none());

        assert!(!store.apply(record("a", 1, "one"), Origin::SnapshotApi));
        assert!(store.get("a").is_none());

        assert!(store.apply(record("a", 3, "back"), Origin::Stream));
        assert_eq!(value_of(&store, "a"), Some("back".into()));
    }

    #[test]
    fn test_stale_tombstone_does_not_delete() {
        let store = ConfigStore::empty();
        store.apply(record("a", 4, "four"), Origin::Stream);
        assert!(!store.apply(tombstone("a", 4), Origin::Stream));
        assert_eq!(value_of(&store, "a"), Some("four".into()));
    }

    #[test]
    fn test_out_of_order_delivery_converges() {
        let in_order = ConfigStore::empty();
        let shuffled = ConfigStore::empty();
        let records = vec![
            record("a", 1, "a1"),
            record("b", 2, "b2"),
            record("a", 3, "a3"),
            tombstone("b", 4),
            record("c", 5, "c5"),
        ];

        for r in records.clone() {
            in_order.apply(r, Origin::Stream);
        }
        for idx in [4, 2, 0, 3, 1, 2, 4] {
            shuffled.apply(records[idx].clone(), Origin::SnapshotApi);
        }

        assert_eq!(*in_order.snapshot(), *shuffled.snapshot());
        assert_eq!(in_order.highwater_mark(), shuffled.highwater_mark());
    }

    #[test]
    fn test_layer_precedence() {
        let defaults = HashMap::from([
            ("a".to_string(), record("a", 0, "default")),
            ("b".to_string(), record("b", 0, "default")),
            ("c".to_string(), record("c", 0, "default")),
        ]);
        let overrides = HashMap::from([("a".to_string(), record("a", 0, "override"))]);
        let store = ConfigStore::new(defaults, overrides);

        store.apply(record("a", 10, "remote"), Origin::Stream);
        store.apply(record("b", 11, "remote"), Origin::Stream);

        assert_eq!(value_of(&store, "a"), Some("override".into()));
        assert_eq!(value_of(&store, "b"), Some("remote".into()));
        assert_eq!(value_of(&store, "c"), Some("default".into()));
        assert_eq!(store.origin_of("a"), Some(Origin::StaticOverride));
        assert_eq!(store.origin_of("c"), Some(Origin::StaticDefault));
    }

    #[test]
    fn test_tombstone_uncovers_default() {
        let defaults = HashMap::from([("a".to_string(), record("a", 0, "default"))]);
        let store = ConfigStore::new(defaults, HashMap::new());
        store.apply(record("a", 1, "remote"), Origin::Stream);
        store.apply(tombstone("a", 2), Origin::Stream);
        assert_eq!(value_of(&store, "a"), Some("default".into()));
    }

    #[test]
    fn test_api_deltas_only_dynamic() {
        let defaults = HashMap::from([("d".to_string(), record("d", 0, "default"))]);
        let store = ConfigStore::new(defaults, HashMap::new());
        store.apply(record("x", 1, "x"), Origin::SnapshotCdn);
        store.apply(record("y", 2, "y"), Origin::Stream);
        store.apply(tombstone("y", 3), Origin::Stream);

        let deltas = store.api_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].key, "x");
    }

    #[test]
    fn test_static_origin_is_rejected() {
        let store = ConfigStore::empty();
        let outcome = store.apply_batch(
            ConfigBatch::new(vec![record("a", 1, "x"), record("b", 2, "y")]),
            Origin::StaticOverride,
        );
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.ignored, 2);
        assert!(!store.apply(record("a", 3, "z"), Origin::StaticDefault));
        assert!(store.is_empty());
        assert_eq!(store.highwater_mark(), 0);
    }

    #[test]
    fn test_applied_at_tracks_dynamic_records() {
        let defaults = HashMap::from([("d".to_string(), record("d", 0, "default"))]);
        let store = ConfigStore::new(defaults, HashMap::new());
        let before = Utc::now();
        store.apply(record("a", 1, "one"), Origin::Stream);
        let first = store.applied_at("a").unwrap();
        assert!(first >= before);
        assert!(store.applied_at("d").is_none());

        store.apply(record("a", 2, "two"), Origin::Stream);
        assert!(store.applied_at("a").unwrap() >= first);

        store.apply(tombstone("a", 3), Origin::Stream);
        assert!(store.applied_at("a").is_none());
    }

    #[test]
    fn test_batch_pointer_sets_environment() {
        let store = ConfigStore::empty();
        let batch = ConfigBatch::new(vec![record("a", 1, "a")]).with_pointer(ConfigServicePointer {
            project_id: 1,
            start_at_id: 0,
            project_env_id: 42,
        });
        let outcome = store.apply_batch(batch, Origin::SnapshotApi);
        assert!(outcome.advanced());
        assert_eq!(store.project_env_id(), Some(42));

        let (configs, env) = store.view();
        assert!(configs.contains_key("a"));
        assert_eq!(env, Some(42));
    }

    #[test]
    fn test_concurrent_apply_and_snapshot() {
        let store = Arc::new(ConfigStore::empty());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for id in 1..=200 {
                    let batch = ConfigBatch::new(vec![
                        record("left", id, &id.to_string()),
                        record("right", id, &id.to_string()),
                    ]);
                    store.apply_batch(batch, Origin::Stream);
                }
            })
        };

        for _ in 0..200 {
            let view = store.snapshot();
            // Both halves of a batch land together.
            assert_eq!(
                view.get("left").map(|r| r.id),
                view.get("right").map(|r| r.id)
            );
        }

        writer.join().unwrap();
        assert_eq!(store.highwater_mark(), 200);
    }
}
