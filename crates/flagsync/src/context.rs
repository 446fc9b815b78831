//! Query context: the identity and properties a lookup is evaluated against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A property value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Bool(b) => write!(f, "{}", b),
            ContextValue::Int(i) => write!(f, "{}", i),
            ContextValue::Double(d) => write!(f, "{}", d),
            ContextValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::String(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::String(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Int(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::Double(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

/// Lookup key plus named properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_key: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity used for key membership and bucketing.
    pub fn with_lookup_key(mut self, lookup_key: impl Into<String>) -> Self {
        self.lookup_key = Some(lookup_key.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&ContextValue> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ctx = Context::new()
            .with_lookup_key("user:1")
            .with_property("env", "prod")
            .with_property("age", 42i64);
        assert_eq!(ctx.lookup_key.as_deref(), Some("user:1"));
        assert_eq!(ctx.property("env").map(ToString::to_string), Some("prod".to_string()));
        assert_eq!(ctx.property("age"), Some(&ContextValue::Int(42)));
        assert!(ctx.property("missing").is_none());
    }

    #[test]
    fn test_untagged_properties() {
        let ctx: Context =
            serde_json::from_str(r#"{"lookup_key":"u","properties":{"beta":true,"n":3,"s":"x"}}"#)
                .unwrap();
        assert_eq!(ctx.property("beta"), Some(&ContextValue::Bool(true)));
        assert_eq!(ctx.property("n"), Some(&ContextValue::Int(3)));
        assert_eq!(ctx.property("s"), Some(&ContextValue::String("x".into())));
    }
}
