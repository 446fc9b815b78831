//! Client options.
//!
//! Values set on the builder win over environment variables, which win over
//! defaults. In local-only mode the API key and URLs are ignored entirely.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
pub use crate::sync::DEFAULT_CHECKPOINT_INTERVAL;

pub const ENV_API_KEY: &str = "FLAGSYNC_API_KEY";
pub const ENV_API_URL: &str = "FLAGSYNC_API_URL";
pub const ENV_CDN_URL: &str = "FLAGSYNC_CDN_URL";
pub const ENV_DATASOURCES: &str = "FLAGSYNC_DATASOURCES";
pub const ENV_ENVS: &str = "FLAGSYNC_ENVS";

pub const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Which sources feed the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Datasources {
    #[default]
    All,
    /// Static files only; no network at all.
    LocalOnly,
}

/// What a read does when the first load has not finished in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnInitializationFailure {
    /// Fail the read with an initialization timeout.
    Raise,
    /// Carry on with whatever is loaded and stop waiting from then on.
    #[default]
    Return,
}

/// What a read does when nothing matches and no default was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnNoDefault {
    #[default]
    Raise,
    ReturnNone,
}

impl std::str::FromStr for Datasources {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ALL" => Ok(Datasources::All),
            "LOCAL_ONLY" => Ok(Datasources::LocalOnly),
            _ => Err(format!("Unknown datasources: {}", s)),
        }
    }
}

impl std::str::FromStr for OnInitializationFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RAISE" => Ok(OnInitializationFailure::Raise),
            "RETURN" => Ok(OnInitializationFailure::Return),
            _ => Err(format!("Unknown initialization failure policy: {}", s)),
        }
    }
}

impl std::str::FromStr for OnNoDefault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RAISE" => Ok(OnNoDefault::Raise),
            "RETURN_NONE" => Ok(OnNoDefault::ReturnNone),
            _ => Err(format!("Unknown no-default policy: {}", s)),
        }
    }
}

/// Validated client options.
#[derive(Debug)]
pub struct Options {
    pub api_key: Option<SecretString>,
    pub api_url: Option<String>,
    /// Edge snapshot URL. When unset the edge step is skipped and the first
    /// load goes straight to the API.
    pub cdn_url: Option<String>,
    pub datasources: Datasources,
    /// Sorted environment names whose static files are layered over the defaults.
    pub envs: Vec<String>,
    pub initialization_timeout: Duration,
    pub checkpoint_interval: Duration,
    pub on_initialization_failure: OnInitializationFailure,
    pub on_no_default: OnNoDefault,
    pub defaults_dir: PathBuf,
    pub overrides_dir: Option<PathBuf>,
    /// Prepended to tracing targets before looking up their log level.
    pub log_prefix: Option<String>,
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Options taken from the environment alone.
    pub fn from_env() -> Result<Self, OptionsError> {
        Self::builder().build()
    }

    /// Local-only options with no environment lookups for network settings.
    pub fn local_only() -> Self {
        Self {
            api_key: None,
            api_url: None,
            cdn_url: None,
            datasources: Datasources::LocalOnly,
            envs: Vec::new(),
            initialization_timeout: DEFAULT_INITIALIZATION_TIMEOUT,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            on_initialization_failure: OnInitializationFailure::default(),
            on_no_default: OnNoDefault::default(),
            defaults_dir: PathBuf::from("."),
            overrides_dir: dirs::home_dir(),
            log_prefix: None,
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.datasources == Datasources::LocalOnly
    }
}

#[derive(Debug, Default)]
pub struct OptionsBuilder {
    api_key: Option<String>,
    api_url: Option<String>,
    cdn_url: Option<String>,
    datasources: Option<Datasources>,
    envs: Vec<String>,
    initialization_timeout: Option<Duration>,
    checkpoint_interval: Option<Duration>,
    on_initialization_failure: Option<OnInitializationFailure>,
    on_no_default: Option<OnNoDefault>,
    defaults_dir: Option<PathBuf>,
    overrides_dir: Option<PathBuf>,
    log_prefix: Option<String>,
}

impl OptionsBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn cdn_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_url = Some(url.into());
        self
    }

    pub fn datasources(mut self, datasources: Datasources) -> Self {
        self.datasources = Some(datasources);
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.envs.push(env.into());
        self
    }

    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = Some(timeout);
        self
    }

    pub fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }

    pub fn on_initialization_failure(mut self, policy: OnInitializationFailure) -> Self {
        self.on_initialization_failure = Some(policy);
        self
    }

    pub fn on_no_default(mut self, policy: OnNoDefault) -> Self {
        self.on_no_default = Some(policy);
        self
    }

    pub fn defaults_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.defaults_dir = Some(dir.into());
        self
    }

    pub fn overrides_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overrides_dir = Some(dir.into());
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = Some(prefix.into());
        self
    }

    /// Validates against the process environment.
    pub fn build(self) -> Result<Options, OptionsError> {
        self.build_with(|name| std::env::var(name).ok())
    }

    /// Validates using `lookup` in place of the process environment.
    pub fn build_with<F>(self, lookup: F) -> Result<Options, OptionsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let datasources = match self.datasources {
            Some(datasources) => datasources,
            None => lookup(ENV_DATASOURCES)
                .map(|raw| {
                    raw.parse().unwrap_or_else(|e| {
                        log::warn!("{}, using ALL", e);
                        Datasources::All
                    })
                })
                .unwrap_or_default(),
        };

        let mut envs = self.envs;
        envs.extend(parse_envs(lookup(ENV_ENVS).as_deref()));
        envs.sort();

        let (api_key, api_url, cdn_url) = if datasources == Datasources::LocalOnly {
            (None, None, None)
        } else {
            let api_key = validate_api_key(self.api_key.or_else(|| lookup(ENV_API_KEY)))?;
            let api_url = self
                .api_url
                .or_else(|| lookup(ENV_API_URL))
                .ok_or(OptionsError::MissingApiUrl)?;
            let api_url = validate_url(&api_url).ok_or(OptionsError::InvalidApiUrl(api_url))?;
            let cdn_url = match self.cdn_url.or_else(|| lookup(ENV_CDN_URL)) {
                Some(url) => Some(validate_url(&url).ok_or(OptionsError::InvalidCdnUrl(url))?),
                None => None,
            };
            (Some(api_key), Some(api_url), cdn_url)
        };

        let checkpoint_interval = self.checkpoint_interval.unwrap_or(DEFAULT_CHECKPOINT_INTERVAL);
        if checkpoint_interval.is_zero() {
            return Err(OptionsError::InvalidCheckpointInterval);
        }

        Ok(Options {
            api_key,
            api_url,
            cdn_url,
            datasources,
            envs,
            initialization_timeout: self
                .initialization_timeout
                .unwrap_or(DEFAULT_INITIALIZATION_TIMEOUT),
            checkpoint_interval,
            on_initialization_failure: self.on_initialization_failure.unwrap_or_default(),
            on_no_default: self.on_no_default.unwrap_or_default(),
            defaults_dir: self.defaults_dir.unwrap_or_else(|| PathBuf::from(".")),
            overrides_dir: self.overrides_dir.or_else(dirs::home_dir),
            log_prefix: self.log_prefix,
        })
    }
}

fn validate_api_key(api_key: Option<String>) -> Result<SecretString, OptionsError> {
    let api_key = api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(OptionsError::MissingApiKey)?;
    let secret = SecretString::from(api_key);
    if !secret.expose_secret().contains('-') {
        return Err(OptionsError::InvalidApiKey(redact(secret.expose_secret())));
    }
    Ok(secret)
}

/// Keeps only the first few characters of a key for error messages.
fn redact(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}...", visible)
}

fn validate_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(url.trim_end_matches('/').to_string()),
        _ => None,
    }
}

fn parse_envs(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|env| !env.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
