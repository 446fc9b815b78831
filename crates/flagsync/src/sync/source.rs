//! Transport seams consumed by the synchronizer.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::error::Result;
use crate::model::{ConfigBatch, Origin};

/// Lazy, unbounded sequence of batches from a live subscription.
pub type DeltaStream = BoxStream<'static, Result<ConfigBatch>>;

/// Point-in-time fetch of every record newer than a version.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Origin tag attached to the records this source returns.
    fn origin(&self) -> Origin;

    async fn fetch_snapshot(&self, since_version: i64) -> Result<ConfigBatch>;
}

/// Live subscription to record changes after a version.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Opens a subscription. Called again, with the current highwater mark,
    /// after every disconnect.
    async fn subscribe(&self, since_version: i64) -> Result<DeltaStream>;
}
