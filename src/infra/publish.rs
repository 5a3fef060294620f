//! Remote publish client: one JSON POST per request batch, dispatched
//! fire-and-forget so page rendering never waits on the remote
//! transformation service.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::sync::{PublishError, PublishRequest, SyncPublisher};

/// Stand-in used when no remote endpoint is configured: queued
/// batches are logged and dropped.
pub struct NullPublisher;

#[async_trait]
impl SyncPublisher for NullPublisher {
    async fn publish(&self, request: PublishRequest) -> Result<(), PublishError> {
        warn!(
            target = "infra::publish",
            batch = request.item_ids.len(),
            "no remote endpoint configured; sync batch discarded"
        );
        Ok(())
    }
}

pub struct RemotePublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl RemotePublisher {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PublishError::Remote(err.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SyncPublisher for RemotePublisher {
    /// Dispatch the batch on a background task. The returned result
    /// only reflects dispatch itself; delivery outcomes are logged
    /// from the spawned task, and retries belong to the remote side.
    async fn publish(&self, request: PublishRequest) -> Result<(), PublishError> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let batch = request.item_ids.len();
        tokio::spawn(async move {
            match client.post(&endpoint).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        target = "infra::publish",
                        batch,
                        "cache sync batch accepted"
                    );
                }
                Ok(response) => {
                    warn!(
                        target = "infra::publish",
                        batch,
                        status = %response.status(),
                        "remote service rejected sync batch"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "infra::publish",
                        batch,
                        error = %err,
                        "sync batch dispatch failed"
                    );
                }
            }
        });
        Ok(())
    }
}
