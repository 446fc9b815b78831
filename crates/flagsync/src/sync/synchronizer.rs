//! Keeps the store in step with the remote sources.
//!
//! Startup tries each snapshot source in order (edge cache, then API) and
//! stops at the first that answers. After that two loops run side by side
//! until shutdown: a periodic checkpoint from the current highwater mark and
//! a live delta subscription that reconnects with exponential backoff.
//!
//! The first successful apply from any path releases the readiness gate.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::watch;

use super::source::{DeltaSource, SnapshotSource};
use crate::gate::ReadinessGate;
use crate::model::{ConfigBatch, Origin};
use crate::store::{ApplyOutcome, ConfigStore};

/// Default period between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Base delay before the first stream reconnect.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Lifecycle of the synchronizer. Streaming is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
    TimedOut,
}

impl SyncState {
    fn as_u8(self) -> u8 {
        match self {
            SyncState::Uninitialized => 0,
            SyncState::Loading => 1,
            SyncState::Ready => 2,
            SyncState::TimedOut => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Loading,
            2 => SyncState::Ready,
            3 => SyncState::TimedOut,
            _ => SyncState::Uninitialized,
        }
    }
}

/// Shared, lock-free view of the synchronizer's state.
#[derive(Debug)]
pub struct SyncStatus {
    state: AtomicU8,
    streaming: AtomicBool,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(SyncState::Uninitialized.as_u8()),
            streaming: AtomicBool::new(false),
        }
    }
}

impl SyncStatus {
    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Records that a caller gave up waiting for the first load. A later
    /// successful load still moves the state to `Ready`.
    pub fn mark_timed_out(&self) {
        for from in [SyncState::Uninitialized, SyncState::Loading] {
            if self
                .state
                .compare_exchange(
                    from.as_u8(),
                    SyncState::TimedOut.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    fn begin_loading(&self) {
        let _ = self.state.compare_exchange(
            SyncState::Uninitialized.as_u8(),
            SyncState::Loading.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn set(&self, state: SyncState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }
}

/// Exponential backoff for stream reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

pub struct SourceSynchronizer {
    store: Arc<ConfigStore>,
    gate: Arc<ReadinessGate>,
    snapshots: Vec<Arc<dyn SnapshotSource>>,
    deltas: Option<Arc<dyn DeltaSource>>,
    checkpoint_interval: Duration,
    reconnect: ReconnectPolicy,
    status: Arc<SyncStatus>,
}

impl SourceSynchronizer {
    /// A synchronizer with no sources. Add some, or it runs local-only.
    pub fn new(store: Arc<ConfigStore>, gate: Arc<ReadinessGate>) -> Self {
        Self {
            store,
            gate,
            snapshots: Vec::new(),
            deltas: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            status: Arc::new(SyncStatus::default()),
        }
    }

    /// Appends a snapshot source. Sources are tried in insertion order.
    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots.push(source);
        self
    }

    pub fn with_delta_source(mut self, source: Arc<dyn DeltaSource>) -> Self {
        self.deltas = Some(source);
        self
    }

    /// Sets the checkpoint period. A zero period is ignored.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(
                "Ignoring zero checkpoint interval, keeping {:?}",
                self.checkpoint_interval
            );
            return self;
        }
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        Arc::clone(&self.status)
    }

    /// True when no remote source is configured.
    pub fn is_local_only(&self) -> bool {
        self.snapshots.is_empty() && self.deltas.is_none()
    }

    /// Starts the background thread, or in local-only mode releases the
    /// gate and returns a handle with nothing to stop.
    pub fn start(self) -> std::io::Result<SyncHandle> {
        if self.is_local_only() {
            info!("No remote sources configured, running local-only");
            self.mark_ready();
            return Ok(SyncHandle::detached());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let thread = std::thread::Builder::new()
            .name("flagsync-sync".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to start sync runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(self.run(shutdown_rx));
            })?;

        Ok(SyncHandle {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Initial load followed by both loops, until `shutdown` flips to true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.status.begin_loading();

        let mut initial = shutdown.clone();
        tokio::select! {
            _ = self.load_checkpoint() => {}
            _ = wait_for_shutdown(&mut initial) => return,
        }

        tokio::join!(
            self.run_checkpoint_loop(shutdown.clone()),
            self.run_stream_loop(shutdown),
        );
        debug!("Sync loops stopped");
    }

    /// Tries each snapshot source in order from the current highwater mark.
    /// Returns whether any of them answered.
    pub async fn load_checkpoint(&self) -> bool {
        for source in &self.snapshots {
            let origin = source.origin();
            match source.fetch_snapshot(self.store.highwater_mark()).await {
                Ok(batch) => {
                    self.apply(batch, origin);
                    return true;
                }
                Err(e) if e.is_retryable() => {
                    info!("Checkpoint from {} failed, trying next source: {}", origin, e)
                }
                Err(e) => warn!("Checkpoint from {} failed: {}", origin, e),
            }
        }

        if !self.snapshots.is_empty() {
            warn!("No checkpoint source succeeded");
        }
        false
    }

    /// Re-checkpoints on a fixed schedule. Failures are logged and the next
    /// tick tries again.
    pub async fn run_checkpoint_loop(&self, mut shutdown: watch::Receiver<bool>) {
        if self.snapshots.is_empty() {
            return;
        }

        let mut interval = tokio::time::interval(self.checkpoint_interval);
        interval.tick().await; // skip immediate first tick

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => return,
            }

            tokio::select! {
                _ = self.load_checkpoint() => {}
                _ = wait_for_shutdown(&mut shutdown) => return,
            }
        }
    }

    /// Consumes the delta stream, resubscribing from the highwater mark after
    /// every disconnect.
    pub async fn run_stream_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let Some(deltas) = self.deltas.as_ref() else {
            return;
        };

        let mut attempt: u32 = 0;
        loop {
            let since = self.store.highwater_mark();
            let subscribed = tokio::select! {
                result = deltas.subscribe(since) => result,
                _ = wait_for_shutdown(&mut shutdown) => return,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!("Delta stream connected from version {}", since);
                    self.status.set_streaming(true);
                    loop {
                        let next = tokio::select! {
                            item = stream.next() => item,
                            _ = wait_for_shutdown(&mut shutdown) => {
                                self.status.set_streaming(false);
                                return;
                            }
                        };
                        match next {
                            Some(Ok(batch)) => {
                                self.apply(batch, Origin::Stream);
                                attempt = 0;
                            }
                            Some(Err(e)) => {
                                warn!("Delta stream failed: {}", e);
                                break;
                            }
                            None => {
                                info!("Delta stream ended");
                                break;
                            }
                        }
                    }
                    self.status.set_streaming(false);
                }
                Err(e) => warn!("Failed to subscribe to delta stream: {}", e),
            }

            let delay = self.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Reconnecting delta stream in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => return,
            }
        }
    }

    fn apply(&self, batch: ConfigBatch, origin: Origin) -> ApplyOutcome {
        let outcome = self.store.apply_batch(batch, origin);
        if outcome.advanced() {
            info!(
                "Found new checkpoint with highwater id {} from {}",
                outcome.highwater, origin
            );
        } else {
            debug!("No changes from {}, highwater id {}", origin, outcome.highwater);
        }
        self.mark_ready();
        outcome
    }

    fn mark_ready(&self) {
        self.status.set(SyncState::Ready);
        if self.gate.release() {
            info!("Configuration ready");
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        // A dropped sender counts as shutdown.
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Owner of the background thread. Dropping it stops and joins the thread.
pub struct SyncHandle {
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl SyncHandle {
    fn detached() -> Self {
        Self {
            shutdown: None,
            thread: None,
        }
    }

    /// Signals both loops and any in-flight load to stop.
    pub fn stop(&self) {
        if let Some(tx) = &self.shutdown {
            let _ = tx.send(true);
        }
    }

    /// Waits for the background thread to exit.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Sync thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
