//! Remote synchronization: source traits, the HTTP transport and the
//! background synchronizer.

pub mod error;
pub mod http;
pub mod source;
pub mod synchronizer;

pub use error::SourceError;
pub use http::{HttpDeltaSource, HttpSnapshotSource};
pub use source::{DeltaSource, DeltaStream, SnapshotSource};
pub use synchronizer::{
    ReconnectPolicy, SourceSynchronizer, SyncHandle, SyncState, SyncStatus,
    DEFAULT_CHECKPOINT_INTERVAL,
};
