//! Builder patterns for creating test records programmatically.

#![allow(dead_code)]

use flagsync::model::{ConfigServicePointer, WeightedValue};
use flagsync::{
    ConditionalRow, ConfigBatch, ConfigKind, ConfigRecord, ConfigValue, Criterion, Operator,
};

/// Builder for creating `ConfigRecord` instances.
pub struct RecordBuilder {
    record: ConfigRecord,
}

impl RecordBuilder {
    /// A plain config record at the given version.
    pub fn new(key: &str, version: i64) -> Self {
        Self {
            record: ConfigRecord::new(key, version, ConfigKind::Config),
        }
    }

    /// A segment record at the given version.
    pub fn segment(key: &str, version: i64) -> Self {
        Self {
            record: ConfigRecord::new(key, version, ConfigKind::Segment),
        }
    }

    /// Add an unconditional row.
    pub fn always(mut self, value: impl Into<ConfigValue>) -> Self {
        self.record.rows.push(ConditionalRow::always(value.into()));
        self
    }

    /// Add a row guarded by all of `criteria`.
    pub fn when(mut self, criteria: Vec<Criterion>, value: impl Into<ConfigValue>) -> Self {
        self.record
            .rows
            .push(ConditionalRow::new(criteria, value.into()));
        self
    }

    /// Add a row scoped to a project environment.
    pub fn in_env(mut self, env_id: i64, value: impl Into<ConfigValue>) -> Self {
        self.record
            .rows
            .push(ConditionalRow::always(value.into()).in_env(env_id));
        self
    }

    pub fn build(self) -> ConfigRecord {
        self.record
    }
}

/// A tombstone deleting `key` at `version`.
pub fn tombstone(key: &str, version: i64) -> ConfigRecord {
    ConfigRecord::new(key, version, ConfigKind::Config)
}

/// A batch of records without a service pointer.
pub fn batch(records: Vec<ConfigRecord>) -> ConfigBatch {
    ConfigBatch::new(records)
}

/// A batch scoped to a project environment.
pub fn batch_in_env(records: Vec<ConfigRecord>, project_env_id: i64) -> ConfigBatch {
    ConfigBatch::new(records).with_pointer(ConfigServicePointer {
        project_id: 1,
        start_at_id: 0,
        project_env_id,
    })
}

pub fn strings(values: &[&str]) -> ConfigValue {
    ConfigValue::string_list(values.iter().copied())
}

pub fn weighted(variants: &[(&str, u32)]) -> ConfigValue {
    ConfigValue::WeightedValues(flagsync::model::WeightedValues {
        weighted_values: variants
            .iter()
            .map(|(value, weight)| WeightedValue {
                weight: *weight,
                value: (*value).into(),
            })
            .collect(),
    })
}

pub fn prop_is_one_of(property: &str, values: &[&str]) -> Criterion {
    Criterion::new(property, Operator::PropIsOneOf, strings(values))
}

pub fn prop_is_not_one_of(property: &str, values: &[&str]) -> Criterion {
    Criterion::new(property, Operator::PropIsNotOneOf, strings(values))
}

pub fn prop_ends_with(property: &str, suffixes: &[&str]) -> Criterion {
    Criterion::new(property, Operator::PropEndsWithOneOf, strings(suffixes))
}

pub fn prop_does_not_end_with(property: &str, suffixes: &[&str]) -> Criterion {
    Criterion::new(property, Operator::PropDoesNotEndWithOneOf, strings(suffixes))
}

pub fn lookup_key_in(keys: &[&str]) -> Criterion {
    Criterion::new("", Operator::LookupKeyIn, strings(keys))
}

pub fn lookup_key_not_in(keys: &[&str]) -> Criterion {
    Criterion::new("", Operator::LookupKeyNotIn, strings(keys))
}

pub fn in_segment(segment_key: &str) -> Criterion {
    Criterion::new("", Operator::InSeg, segment_key)
}

pub fn not_in_segment(segment_key: &str) -> Criterion {
    Criterion::new("", Operator::NotInSeg, segment_key)
}

pub fn hierarchical(property: &str, path: &str) -> Criterion {
    Criterion::new(property, Operator::HierarchicalMatch, path)
}
