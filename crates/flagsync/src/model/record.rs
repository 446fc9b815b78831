//! Configuration records, their conditional rows and criteria.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::ConfigValue;

/// What a record represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigKind {
    #[default]
    NotSetConfigType,
    Config,
    FeatureFlag,
    LogLevel,
    Segment,
    LimitDefinition,
}

/// A keyed, versioned configuration record.
///
/// `id` is the version assigned by the source of truth. A record without rows
/// is a tombstone and deletes its key from the dynamic layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    pub key: String,
    #[serde(default)]
    pub rows: Vec<ConditionalRow>,
    #[serde(default)]
    pub config_type: ConfigKind,
}

impl ConfigRecord {
    /// Creates a record with no rows.
    pub fn new(key: impl Into<String>, id: i64, config_type: ConfigKind) -> Self {
        Self {
            id,
            project_id: 0,
            key: key.into(),
            rows: Vec::new(),
            config_type,
        }
    }

    /// Creates a record holding a single unconditional value.
    pub fn with_value(key: impl Into<String>, id: i64, value: ConfigValue) -> Self {
        let config_type = match value {
            ConfigValue::LogLevel(_) => ConfigKind::LogLevel,
            ConfigValue::LimitDefinition(_) => ConfigKind::LimitDefinition,
            _ => ConfigKind::Config,
        };
        let mut record = Self::new(key, id, config_type);
        record.rows.push(ConditionalRow::always(value));
        record
    }

    /// Appends a row, keeping stored order.
    pub fn push_row(mut self, row: ConditionalRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A value guarded by criteria that must all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRow {
    /// Environment the row is scoped to; `None` applies to every environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_env_id: Option<i64>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    pub value: ConfigValue,
}

impl ConditionalRow {
    pub fn new(criteria: Vec<Criterion>, value: ConfigValue) -> Self {
        Self {
            project_env_id: None,
            criteria,
            value,
        }
    }

    /// A row without criteria, which matches every context.
    pub fn always(value: ConfigValue) -> Self {
        Self::new(Vec::new(), value)
    }

    pub fn in_env(mut self, project_env_id: i64) -> Self {
        self.project_env_id = Some(project_env_id);
        self
    }
}

/// Comparison applied by a [`Criterion`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    #[default]
    NotSet,
    LookupKeyIn,
    LookupKeyNotIn,
    InSeg,
    NotInSeg,
    AlwaysTrue,
    PropIsOneOf,
    PropIsNotOneOf,
    PropEndsWithOneOf,
    PropDoesNotEndWithOneOf,
    HierarchicalMatch,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::NotSet => "NOT_SET",
            Operator::LookupKeyIn => "LOOKUP_KEY_IN",
            Operator::LookupKeyNotIn => "LOOKUP_KEY_NOT_IN",
            Operator::InSeg => "IN_SEG",
            Operator::NotInSeg => "NOT_IN_SEG",
            Operator::AlwaysTrue => "ALWAYS_TRUE",
            Operator::PropIsOneOf => "PROP_IS_ONE_OF",
            Operator::PropIsNotOneOf => "PROP_IS_NOT_ONE_OF",
            Operator::PropEndsWithOneOf => "PROP_ENDS_WITH_ONE_OF",
            Operator::PropDoesNotEndWithOneOf => "PROP_DOES_NOT_END_WITH_ONE_OF",
            Operator::HierarchicalMatch => "HIERARCHICAL_MATCH",
        };
        write!(f, "{}", name)
    }
}

/// A single typed predicate over a query context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(default)]
    pub property_name: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_to_match: Option<ConfigValue>,
}

impl Criterion {
    pub fn new(
        property_name: impl Into<String>,
        operator: Operator,
        value_to_match: impl Into<ConfigValue>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            operator,
            value_to_match: Some(value_to_match.into()),
        }
    }

    pub fn always_true() -> Self {
        Self {
            property_name: String::new(),
            operator: Operator::AlwaysTrue,
            value_to_match: None,
        }
    }
}

/// Resume cursor and project metadata sent alongside a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigServicePointer {
    pub project_id: i64,
    pub start_at_id: i64,
    pub project_env_id: i64,
}

/// A batch of records as delivered by a snapshot or a stream message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBatch {
    #[serde(default)]
    pub configs: Vec<ConfigRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_service_pointer: Option<ConfigServicePointer>,
}

impl ConfigBatch {
    pub fn new(configs: Vec<ConfigRecord>) -> Self {
        Self {
            configs,
            config_service_pointer: None,
        }
    }

    pub fn with_pointer(mut self, pointer: ConfigServicePointer) -> Self {
        self.config_service_pointer = Some(pointer);
        self
    }
}

/// Where a record came from. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    StaticDefault,
    StaticOverride,
    SnapshotCdn,
    SnapshotApi,
    Stream,
}

impl Origin {
    /// Whether records from this origin belong to the dynamic layer.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Origin::SnapshotCdn | Origin::SnapshotApi | Origin::Stream)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::StaticDefault => "static_default",
            Origin::StaticOverride => "static_override",
            Origin::SnapshotCdn => "snapshot_cdn",
            Origin::SnapshotApi => "snapshot_api",
            Origin::Stream => "stream",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogLevel;

    #[test]
    fn test_record_json_roundtrip_keeps_rows_in_order() {
        let json = r#"{
            "id": 12,
            "key": "checkout.flow",
            "config_type": "FEATURE_FLAG",
            "rows": [
                {
                    "criteria": [
                        {"property_name": "env", "operator": "PROP_IS_ONE_OF",
                         "value_to_match": {"string_list": {"values": ["staging"]}}}
                    ],
                    "value": {"string": "new"}
                },
                {"project_env_id": 3, "value": {"string": "old"}}
            ]
        }"#;

        let record: ConfigRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 12);
        assert_eq!(record.config_type, ConfigKind::FeatureFlag);
        assert_eq!(record.rows.len(), 2);
        assert_eq!(record.rows[0].criteria[0].operator, Operator::PropIsOneOf);
        assert_eq!(record.rows[1].project_env_id, Some(3));
        assert!(record.rows[1].criteria.is_empty());
        assert!(!record.is_tombstone());
    }

    #[test]
    fn test_tombstone() {
        let record: ConfigRecord = serde_json::from_str(r#"{"id": 4, "key": "gone"}"#).unwrap();
        assert!(record.is_tombstone());
        assert_eq!(record.config_type, ConfigKind::NotSetConfigType);
    }

    #[test]
    fn test_with_value_infers_kind() {
        let record = ConfigRecord::with_value("log-level.app", 0, LogLevel::Info.into());
        assert_eq!(record.config_type, ConfigKind::LogLevel);
        assert_eq!(ConfigRecord::with_value("k", 0, 5i64.into()).config_type, ConfigKind::Config);
    }

    #[test]
    fn test_origin_layers() {
        assert!(Origin::Stream.is_dynamic());
        assert!(Origin::SnapshotCdn.is_dynamic());
        assert!(!Origin::StaticOverride.is_dynamic());
        assert_eq!(Origin::SnapshotApi.to_string(), "snapshot_api");
    }
}
