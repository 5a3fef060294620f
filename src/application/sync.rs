//! Remote publish seam for the end-of-request sync flush.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action name carried on every batched publish call.
pub const UPLOAD_CACHE_ACTION: &str = "upload_cache";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("remote publish failed: {0}")]
    Remote(String),
}

/// One batched publish call: the action name and every queued item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub action: String,
    pub item_ids: Vec<i64>,
}

impl PublishRequest {
    pub fn upload_cache(item_ids: Vec<i64>) -> Self {
        Self {
            action: UPLOAD_CACHE_ACTION.to_string(),
            item_ids,
        }
    }
}

/// The remote transformation/upload service, at its interface
/// boundary. The registry issues at most one call per request and
/// never waits on the response; retry policy belongs to the remote
/// side.
#[async_trait]
pub trait SyncPublisher: Send + Sync {
    async fn publish(&self, request: PublishRequest) -> Result<(), PublishError>;
}

/// Summary of one end-of-request flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub points_persisted: usize,
    pub items_persisted: usize,
    pub items_published: usize,
}
