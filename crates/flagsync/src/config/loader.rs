//! Static configuration files.
//!
//! A directory may hold `.flagsync.default.config.yaml` and one
//! `.flagsync.<env>.config.yaml` per environment. Files are applied in that
//! order, later keys replacing earlier ones. Nested mappings flatten into
//! dotted keys:
//!
//! ```yaml
//! log-level:
//!   app: debug
//! checkout:
//!   enabled: true
//!   regions: [eu, us]
//! ```
//!
//! yields `log-level.app`, `checkout.enabled` and `checkout.regions`.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, warn};
use serde_yaml::Value;

use crate::error::LoadError;
use crate::model::{ConfigRecord, ConfigValue, LogLevel};
use crate::resolver::LOG_LEVEL_BASE_KEY;
use crate::store::ConfigMap;

const FILE_PREFIX: &str = ".flagsync";
const DEFAULT_ENV: &str = "default";

/// Version given to every statically loaded record.
pub const STATIC_VERSION: i64 = 0;

/// Loads static configuration for a fixed list of environments.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    envs: Vec<String>,
}

impl StaticConfigLoader {
    pub fn new(envs: &[String]) -> Self {
        Self {
            envs: envs.to_vec(),
        }
    }

    /// File name read for an environment.
    pub fn file_name(env: &str) -> String {
        format!("{}.{}.config.yaml", FILE_PREFIX, env)
    }

    /// Loads the default file, then each environment's, from `dir`.
    /// Missing files are skipped.
    pub fn load_dir(&self, dir: &Path) -> Result<ConfigMap, LoadError> {
        let mut configs = ConfigMap::new();
        let envs = std::iter::once(DEFAULT_ENV).chain(self.envs.iter().map(String::as_str));
        for env in envs {
            for path in matching_files(dir, env)? {
                let loaded = load_file(&path)?;
                debug!("Loaded {} keys from {}", loaded.len(), path.display());
                configs.extend(loaded);
            }
        }
        Ok(configs)
    }
}

fn matching_files(dir: &Path, env: &str) -> Result<Vec<PathBuf>, LoadError> {
    let pattern = format!(
        "{}/{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(&StaticConfigLoader::file_name(env))
    );

    let entries = glob::glob(&pattern).map_err(|e| LoadError::InvalidPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(LoadError::ReadFile {
                    path,
                    source: e.into_error(),
                });
            }
        }
    }
    Ok(paths)
}

/// Reads and flattens a single YAML file.
pub fn load_file(path: &Path) -> Result<ConfigMap, LoadError> {
    let content = fs::read_to_string(path).map_err(|e| LoadError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_str(&content, path)
}

/// Flattens YAML text. `path` is only used in error messages.
pub fn parse_str(content: &str, path: &Path) -> Result<ConfigMap, LoadError> {
    let document: Value = serde_yaml::from_str(content).map_err(|e| LoadError::ParseYaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut configs = ConfigMap::new();
    match document {
        Value::Null => {}
        Value::Mapping(_) => flatten(None, &document, path, &mut configs)?,
        _ => {
            return Err(LoadError::ParseYaml {
                path: path.to_path_buf(),
                message: "top level must be a mapping".to_string(),
            })
        }
    }
    Ok(configs)
}

fn flatten(
    prefix: Option<&str>,
    value: &Value,
    path: &Path,
    out: &mut ConfigMap,
) -> Result<(), LoadError> {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let segment = scalar_text(k).ok_or_else(|| LoadError::UnsupportedValue {
                    path: path.to_path_buf(),
                    key: prefix.unwrap_or_default().to_string(),
                    reason: "mapping keys must be scalars".to_string(),
                })?;
                let key = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, segment),
                    None => segment,
                };
                flatten(Some(&key), v, path, out)?;
            }
        }
        Value::Null => {
            if let Some(key) = prefix {
                warn!("Skipping empty value for '{}' in {}", key, path.display());
            }
        }
        _ => {
            let key = prefix.unwrap_or_default();
            let converted = to_config_value(key, value).map_err(|reason| {
                LoadError::UnsupportedValue {
                    path: path.to_path_buf(),
                    key: key.to_string(),
                    reason,
                }
            })?;
            out.insert(
                key.to_string(),
                ConfigRecord::with_value(key, STATIC_VERSION, converted),
            );
        }
    }
    Ok(())
}

fn is_log_level_key(key: &str) -> bool {
    key == LOG_LEVEL_BASE_KEY
        || key
            .strip_prefix(LOG_LEVEL_BASE_KEY)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn to_config_value(key: &str, value: &Value) -> Result<ConfigValue, String> {
    if is_log_level_key(key) {
        let text = scalar_text(value).ok_or("log levels must be scalars")?;
        return text.parse::<LogLevel>().map(ConfigValue::from);
    }

    match value {
        Value::Bool(b) => Ok(ConfigValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ConfigValue::Int(i)),
            None => n
                .as_f64()
                .map(ConfigValue::Double)
                .ok_or_else(|| format!("number out of range: {}", n)),
        },
        Value::String(s) => Ok(ConfigValue::String(s.clone())),
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_text(item).ok_or("lists may only hold scalars"))
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::from)
            .map_err(str::to_string),
        Value::Tagged(_) => Err("tagged values are not supported".to_string()),
        Value::Null | Value::Mapping(_) => Err("expected a scalar or a list".to_string()),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
