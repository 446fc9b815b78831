//! Typed configuration values.
//!
//! A [`ConfigValue`] holds exactly one payload. The serialized form is
//! externally tagged with the wire field names, e.g. `{"string": "on"}` or
//! `{"weighted_values": {"weighted_values": [...]}}`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
    Double(f64),
    Bool(bool),
    StringList(StringList),
    WeightedValues(WeightedValues),
    LogLevel(LogLevel),
    LimitDefinition(LimitDefinition),
}

impl ConfigValue {
    /// Builds a string-list value.
    pub fn string_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigValue::StringList(StringList {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Builds a weighted-value set from `(value, weight)` pairs, keeping their order.
    pub fn weighted<I>(variants: I) -> Self
    where
        I: IntoIterator<Item = (ConfigValue, u32)>,
    {
        ConfigValue::WeightedValues(WeightedValues {
            weighted_values: variants
                .into_iter()
                .map(|(value, weight)| WeightedValue { weight, value })
                .collect(),
        })
    }

    /// Name of the populated variant, as used on the wire.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Int(_) => "int",
            ConfigValue::String(_) => "string",
            ConfigValue::Bytes(_) => "bytes",
            ConfigValue::Double(_) => "double",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::StringList(_) => "string_list",
            ConfigValue::WeightedValues(_) => "weighted_values",
            ConfigValue::LogLevel(_) => "log_level",
            ConfigValue::LimitDefinition(_) => "limit_definition",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ConfigValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::StringList(list) => Some(&list.values),
            _ => None,
        }
    }

    pub fn as_log_level(&self) -> Option<LogLevel> {
        match self {
            ConfigValue::LogLevel(level) => Some(*level),
            _ => None,
        }
    }

    /// Returns the comparison literals this value contributes when used as a
    /// criterion's match value.
    ///
    /// String lists contribute every element, scalars contribute their string
    /// rendering, and composite values contribute nothing.
    pub fn literals(&self) -> Vec<Cow<'_, str>> {
        match self {
            ConfigValue::StringList(list) => {
                list.values.iter().map(|v| Cow::Borrowed(v.as_str())).collect()
            }
            ConfigValue::String(s) => vec![Cow::Borrowed(s.as_str())],
            ConfigValue::Int(i) => vec![Cow::Owned(i.to_string())],
            ConfigValue::Double(d) => vec![Cow::Owned(d.to_string())],
            ConfigValue::Bool(b) => vec![Cow::Owned(b.to_string())],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::String(s) => write!(f, "{}", s),
            ConfigValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ConfigValue::Double(d) => write!(f, "{}", d),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::StringList(list) => write!(f, "[{}]", list.values.join(", ")),
            ConfigValue::WeightedValues(set) => {
                write!(f, "<{} weighted values>", set.weighted_values.len())
            }
            ConfigValue::LogLevel(level) => write!(f, "{}", level),
            ConfigValue::LimitDefinition(def) => {
                write!(f, "<limit {:?} {}/{}>", def.policy_name, def.limit, def.burst)
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Double(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<LogLevel> for ConfigValue {
    fn from(value: LogLevel) -> Self {
        ConfigValue::LogLevel(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(values: Vec<String>) -> Self {
        ConfigValue::StringList(StringList { values })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringList {
    #[serde(default)]
    pub values: Vec<String>,
}

/// One variant of a weighted-value set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedValue {
    pub weight: u32,
    pub value: ConfigValue,
}

/// An ordered set of weighted variants. Order matters for bucketing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedValues {
    #[serde(default)]
    pub weighted_values: Vec<WeightedValue>,
}

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    NotSetLogLevel,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Wire number of the level.
    pub fn as_i32(self) -> i32 {
        match self {
            LogLevel::NotSetLogLevel => 0,
            LogLevel::Trace => 1,
            LogLevel::Debug => 2,
            LogLevel::Info => 3,
            LogLevel::Warn => 5,
            LogLevel::Error => 6,
            LogLevel::Fatal => 9,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(LogLevel::NotSetLogLevel),
            1 => Some(LogLevel::Trace),
            2 => Some(LogLevel::Debug),
            3 => Some(LogLevel::Info),
            5 => Some(LogLevel::Warn),
            6 => Some(LogLevel::Error),
            9 => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::NotSetLogLevel => "NOT_SET_LOG_LEVEL",
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "not_set_log_level" | "not_set" => Ok(LogLevel::NotSetLogLevel),
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitPolicyName {
    #[default]
    NotSet,
    SecondlyRolling,
    MinutelyRolling,
    HourlyRolling,
    DailyRolling,
    MonthlyRolling,
    Infinite,
    YearlyRolling,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLevel {
    #[default]
    #[serde(rename = "NOT_SET")]
    NotSet,
    #[serde(rename = "L4_BEST_EFFORT")]
    L4BestEffort,
    #[serde(rename = "L5_BOMBPROOF")]
    L5Bombproof,
}

/// Rate-limit definition. Carried as data only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitDefinition {
    pub policy_name: LimitPolicyName,
    pub limit: i32,
    pub burst: i32,
    pub account_id: i64,
    pub last_modified: i64,
    pub returnable: bool,
    pub safety_level: SafetyLevel,
}
