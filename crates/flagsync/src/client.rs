//! The caller-facing client.
//!
//! A client owns the store, the readiness gate and the background sync
//! thread. Reads wait on the gate until the first load finishes (bounded by
//! the initialization timeout) and then never block again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::{
    OnInitializationFailure, OnNoDefault, Options, StaticConfigLoader,
};
use crate::context::Context;
use crate::error::{ClientError, OptionsError};
use crate::gate::ReadinessGate;
use crate::log_level::ConfigLevelFilter;
use crate::model::{ConfigRecord, ConfigValue, LogLevel};
use crate::resolver::Resolver;
use crate::store::{ConfigMap, ConfigStore};
use crate::sync::{
    DeltaSource, HttpDeltaSource, HttpSnapshotSource, ReconnectPolicy, SnapshotSource,
    SourceSynchronizer, SyncHandle, SyncState, SyncStatus,
};

pub type Result<T> = std::result::Result<T, ClientError>;

/// The option values a running client still needs.
#[derive(Debug, Clone)]
struct ClientSettings {
    initialization_timeout: Duration,
    on_initialization_failure: OnInitializationFailure,
    on_no_default: OnNoDefault,
    log_prefix: Option<String>,
}

pub struct ConfigClient {
    settings: ClientSettings,
    resolver: Resolver,
    gate: Arc<ReadinessGate>,
    status: Arc<SyncStatus>,
    sync: Mutex<Option<SyncHandle>>,
}

impl ConfigClient {
    /// Loads static files, then starts syncing from the sources the options
    /// describe.
    pub fn new(options: Options) -> Result<Self> {
        Self::builder(options).build()
    }

    pub fn builder(options: Options) -> ClientBuilder {
        ClientBuilder::new(options)
    }

    /// Resolves `key` for `context`.
    ///
    /// When nothing matches, `default` is returned if given; otherwise the
    /// no-default policy decides between an error and `Ok(None)`.
    pub fn get(
        &self,
        key: &str,
        context: &Context,
        default: Option<ConfigValue>,
    ) -> Result<Option<ConfigValue>> {
        let _span = tracing::debug_span!("config_get", key).entered();
        self.wait_until_ready(key)?;
        match self.resolver.get(key, context) {
            Some(value) => Ok(Some(value)),
            None => self.fallback(key, default),
        }
    }

    pub fn get_string(
        &self,
        key: &str,
        context: &Context,
        default: Option<String>,
    ) -> Result<Option<String>> {
        self.get_typed(key, context, default, "string", |v| {
            v.as_str().map(str::to_string)
        })
    }

    pub fn get_int(&self, key: &str, context: &Context, default: Option<i64>) -> Result<Option<i64>> {
        self.get_typed(key, context, default, "int", ConfigValue::as_int)
    }

    pub fn get_double(
        &self,
        key: &str,
        context: &Context,
        default: Option<f64>,
    ) -> Result<Option<f64>> {
        self.get_typed(key, context, default, "double", ConfigValue::as_double)
    }

    pub fn get_bool(&self, key: &str, context: &Context, default: Option<bool>) -> Result<Option<bool>> {
        self.get_typed(key, context, default, "bool", ConfigValue::as_bool)
    }

    pub fn get_string_list(
        &self,
        key: &str,
        context: &Context,
        default: Option<Vec<String>>,
    ) -> Result<Option<Vec<String>>> {
        self.get_typed(key, context, default, "string_list", |v| {
            v.as_string_list().map(<[String]>::to_vec)
        })
    }

    pub fn get_log_level(
        &self,
        key: &str,
        context: &Context,
        default: Option<LogLevel>,
    ) -> Result<Option<LogLevel>> {
        self.get_typed(key, context, default, "log_level", ConfigValue::as_log_level)
    }

    /// True only when the flag resolves to `bool true`. Missing flags and
    /// flags of another type are off.
    pub fn feature_is_on(&self, key: &str, context: &Context) -> Result<bool> {
        self.wait_until_ready(key)?;
        Ok(self
            .resolver
            .get(key, context)
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    /// Effective level for a dotted path under `log-level`. Never waits on
    /// the gate, so it is safe to call from the logging path.
    pub fn log_level_for(&self, path: &str) -> LogLevel {
        self.resolver.log_level(path)
    }

    /// A per-layer filter reading levels from this client's store.
    pub fn level_filter(&self) -> ConfigLevelFilter {
        ConfigLevelFilter::new(self.resolver.clone(), self.settings.log_prefix.clone())
    }

    /// Records currently held from remote sources.
    pub fn get_api_deltas(&self) -> Vec<ConfigRecord> {
        self.resolver.store().api_deltas()
    }

    pub fn highwater_mark(&self) -> i64 {
        self.resolver.store().highwater_mark()
    }

    /// When a remote source last changed `key`. `None` for keys served only
    /// by static files.
    pub fn updated_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.resolver.store().applied_at(key)
    }

    pub fn sync_state(&self) -> SyncState {
        self.status.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.status.is_streaming()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_released()
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        self.resolver.store()
    }

    /// Stops the background sync and waits for it to exit. Reads keep
    /// working against the last loaded state.
    pub fn shutdown(&self) {
        let handle = match self.sync.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut handle) = handle {
            handle.stop();
            handle.join();
            info!("Config client shut down");
        }
    }

    fn get_typed<T, F>(
        &self,
        key: &str,
        context: &Context,
        default: Option<T>,
        expected: &'static str,
        extract: F,
    ) -> Result<Option<T>>
    where
        F: Fn(&ConfigValue) -> Option<T>,
    {
        self.wait_until_ready(key)?;
        match self.resolver.get(key, context) {
            Some(value) => extract(&value)
                .map(Some)
                .ok_or_else(|| ClientError::TypeMismatch {
                    key: key.to_string(),
                    expected,
                    found: value.kind_name(),
                }),
            None => self.fallback(key, default),
        }
    }

    fn fallback<T>(&self, key: &str, default: Option<T>) -> Result<Option<T>> {
        match (default, self.settings.on_no_default) {
            (Some(default), _) => Ok(Some(default)),
            (None, OnNoDefault::Raise) => Err(ClientError::MissingDefault {
                key: key.to_string(),
            }),
            (None, OnNoDefault::ReturnNone) => Ok(None),
        }
    }

    fn wait_until_ready(&self, key: &str) -> Result<()> {
        let timeout = self.settings.initialization_timeout;
        if self.gate.wait_for_ready(timeout) {
            return Ok(());
        }

        self.status.mark_timed_out();
        match self.settings.on_initialization_failure {
            OnInitializationFailure::Raise => Err(ClientError::InitializationTimeout {
                timeout_secs: timeout.as_secs(),
                key: key.to_string(),
            }),
            OnInitializationFailure::Return => {
                // Later reads stop waiting too.
                self.gate.release();
                warn!(
                    "Couldn't initialize in {:?}. Key {}. Returning what we have.",
                    timeout, key
                );
                Ok(())
            }
        }
    }
}

impl Drop for ConfigClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds a client, optionally with custom sources or extra static records.
pub struct ClientBuilder {
    options: Options,
    snapshot_sources: Vec<Arc<dyn SnapshotSource>>,
    delta_source: Option<Arc<dyn DeltaSource>>,
    custom_sources: bool,
    defaults: ConfigMap,
    overrides: ConfigMap,
    reconnect: Option<ReconnectPolicy>,
}

impl ClientBuilder {
    fn new(options: Options) -> Self {
        Self {
            options,
            snapshot_sources: Vec::new(),
            delta_source: None,
            custom_sources: false,
            defaults: ConfigMap::new(),
            overrides: ConfigMap::new(),
            reconnect: None,
        }
    }

    /// Replaces the HTTP sources. Sources are tried in the order added.
    pub fn snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_sources.push(source);
        self.custom_sources = true;
        self
    }

    pub fn delta_source(mut self, source: Arc<dyn DeltaSource>) -> Self {
        self.delta_source = Some(source);
        self.custom_sources = true;
        self
    }

    /// Adds a default record on top of those loaded from files.
    pub fn default_record(mut self, record: ConfigRecord) -> Self {
        self.defaults.insert(record.key.clone(), record);
        self
    }

    /// Adds an override record on top of those loaded from files.
    pub fn override_record(mut self, record: ConfigRecord) -> Self {
        self.overrides.insert(record.key.clone(), record);
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    pub fn build(self) -> Result<ConfigClient> {
        let options = self.options;
        let loader = StaticConfigLoader::new(&options.envs);

        let mut defaults = loader.load_dir(&options.defaults_dir)?;
        defaults.extend(self.defaults);
        let mut overrides = match &options.overrides_dir {
            Some(dir) => loader.load_dir(dir)?,
            None => ConfigMap::new(),
        };
        overrides.extend(self.overrides);

        let store = Arc::new(ConfigStore::new(defaults, overrides));
        let gate = Arc::new(ReadinessGate::new());

        let mut sync = SourceSynchronizer::new(Arc::clone(&store), Arc::clone(&gate))
            .with_checkpoint_interval(options.checkpoint_interval);
        if let Some(policy) = self.reconnect {
            sync = sync.with_reconnect_policy(policy);
        }

        if !options.is_local_only() {
            if self.custom_sources {
                for source in self.snapshot_sources {
                    sync = sync.with_snapshot_source(source);
                }
                if let Some(source) = self.delta_source {
                    sync = sync.with_delta_source(source);
                }
            } else {
                sync = with_http_sources(sync, &options)?;
            }
        }

        let status = sync.status();
        let handle = sync.start().map_err(ClientError::Spawn)?;

        Ok(ConfigClient {
            settings: ClientSettings {
                initialization_timeout: options.initialization_timeout,
                on_initialization_failure: options.on_initialization_failure,
                on_no_default: options.on_no_default,
                log_prefix: options.log_prefix,
            },
            resolver: Resolver::new(store),
            gate,
            status,
            sync: Mutex::new(Some(handle)),
        })
    }
}

fn with_http_sources(sync: SourceSynchronizer, options: &Options) -> Result<SourceSynchronizer> {
    let api_key = options.api_key.as_ref().ok_or(OptionsError::MissingApiKey)?;
    let api_url = options.api_url.as_deref().ok_or(OptionsError::MissingApiUrl)?;

    let mut sync = sync;
    if let Some(cdn_url) = &options.cdn_url {
        sync = sync.with_snapshot_source(Arc::new(HttpSnapshotSource::cdn(cdn_url, api_key)?));
    }
    Ok(sync
        .with_snapshot_source(Arc::new(HttpSnapshotSource::api(api_url, api_key)?))
        .with_delta_source(Arc::new(HttpDeltaSource::new(api_url, api_key)?)))
}
