//! Test harness for isolated client execution.
//!
//! The `TestHarness` struct owns temporary directories for static default
//! and override files, and builds clients against them. Remote sources are
//! replaced with scripted fakes so no test touches the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tempfile::TempDir;
use tokio::sync::mpsc;

use flagsync::sync::{DeltaSource, DeltaStream, SnapshotSource, SourceError};
use flagsync::{ConfigBatch, Datasources, Options, OptionsBuilder, Origin};

/// Isolated environment with default and override directories.
pub struct TestHarness {
    temp_dir: TempDir,
    pub defaults_dir: PathBuf,
    pub overrides_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let defaults_dir = temp_dir.path().join("defaults");
        let overrides_dir = temp_dir.path().join("overrides");
        fs::create_dir_all(&defaults_dir).expect("Failed to create defaults dir");
        fs::create_dir_all(&overrides_dir).expect("Failed to create overrides dir");
        Self {
            temp_dir,
            defaults_dir,
            overrides_dir,
        }
    }

    /// Write `.flagsync.<env>.config.yaml` into the defaults directory.
    pub fn write_defaults(&self, env: &str, yaml: &str) {
        let path = self.defaults_dir.join(format!(".flagsync.{}.config.yaml", env));
        fs::write(path, yaml).expect("Failed to write defaults file");
    }

    /// Write `.flagsync.<env>.config.yaml` into the overrides directory.
    pub fn write_overrides(&self, env: &str, yaml: &str) {
        let path = self.overrides_dir.join(format!(".flagsync.{}.config.yaml", env));
        fs::write(path, yaml).expect("Failed to write overrides file");
    }

    /// Options pointing at the harness directories, with fake credentials.
    pub fn options(&self) -> OptionsBuilder {
        Options::builder()
            .api_key("123-test-key")
            .api_url("http://127.0.0.1:9")
            .defaults_dir(&self.defaults_dir)
            .overrides_dir(&self.overrides_dir)
            .initialization_timeout(Duration::from_secs(5))
    }

    /// Local-only options, no environment lookups.
    pub fn local_options(&self) -> Options {
        self.options()
            .datasources(Datasources::LocalOnly)
            .build_with(|_| None)
            .expect("valid options")
    }

    /// Networked options, no environment lookups.
    pub fn remote_options(&self) -> Options {
        self.options().build_with(|_| None).expect("valid options")
    }
}

/// Blocks until `condition` holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Snapshot source answering from a queue; an empty queue answers 503.
pub struct ScriptedSnapshot {
    origin: Origin,
    responses: Mutex<VecDeque<Result<ConfigBatch, SourceError>>>,
    calls: AtomicUsize,
    sinces: Mutex<Vec<i64>>,
}

impl ScriptedSnapshot {
    pub fn new(origin: Origin, responses: Vec<Result<ConfigBatch, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            origin,
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            sinces: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(origin: Origin) -> Arc<Self> {
        Self::new(origin, vec![])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sinces(&self) -> Vec<i64> {
        self.sinces.lock().unwrap().clone()
    }
}

pub fn unavailable() -> SourceError {
    SourceError::Status {
        url: "scripted".into(),
        status: 503,
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshot {
    fn origin(&self) -> Origin {
        self.origin
    }

    async fn fetch_snapshot(&self, since_version: i64) -> Result<ConfigBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sinces.lock().unwrap().push(since_version);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }
}

/// Delta source fed live from the test through a channel.
///
/// The first subscription receives the channel; later subscriptions (after a
/// disconnect) stay open without yielding.
pub struct ScriptedDeltas {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<ConfigBatch, SourceError>>>>,
    sinces: Mutex<Vec<i64>>,
}

impl ScriptedDeltas {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<Result<ConfigBatch, SourceError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            receiver: Mutex::new(Some(rx)),
            sinces: Mutex::new(Vec::new()),
        });
        (source, tx)
    }

    pub fn sinces(&self) -> Vec<i64> {
        self.sinces.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeltaSource for ScriptedDeltas {
    async fn subscribe(&self, since_version: i64) -> Result<DeltaStream, SourceError> {
        self.sinces.lock().unwrap().push(since_version);
        let receiver = self.receiver.lock().unwrap().take();
        match receiver {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}
