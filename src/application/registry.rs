//! Cache point registry: the set of registered and currently-active
//! root mappings, their exclusion sets, and the end-of-request flush.
//!
//! Resolution itself (`get_cached_urls`) lives in
//! [`crate::application::resolve`].

use std::sync::{Arc, RwLock};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::metadata::MetaCache;
use crate::application::repos::{CacheItemsRepo, CachePointsRepo, CreateCachePointParams};
use crate::application::scope::{DEFAULT_SYNC_LIMIT, RequestScope};
use crate::application::sync::{FlushReport, PublishRequest, SyncPublisher};
use crate::domain::entities::CachePointRecord;
use crate::domain::error::DomainError;
use crate::domain::meta::PointMeta;
use crate::domain::types::RecordStatus;
use crate::domain::url::{canonicalize, clean_url, key_name, under_prefix};
use crate::infra::fs::PathResolver;

/// Tunables for the registry, sourced from the `[cache]` settings
/// section.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Cap on per-request sync fan-out.
    pub sync_limit: usize,
    /// Staleness TTL for attempted-but-unresolved variants.
    pub freshness_ttl: time::Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sync_limit: DEFAULT_SYNC_LIMIT,
            freshness_ttl: time::Duration::minutes(10),
        }
    }
}

/// One entry of the active set, in activation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePoint {
    pub id: Uuid,
    pub url_prefix: String,
}

pub struct CacheRegistry {
    pub(crate) points: Arc<dyn CachePointsRepo>,
    pub(crate) items: Arc<dyn CacheItemsRepo>,
    pub(crate) resolver: Arc<PathResolver>,
    publisher: Arc<dyn SyncPublisher>,
    pub(crate) meta: MetaCache,
    active: RwLock<Vec<ActivePoint>>,
    pub(crate) config: RegistryConfig,
}

impl CacheRegistry {
    pub fn new(
        points: Arc<dyn CachePointsRepo>,
        items: Arc<dyn CacheItemsRepo>,
        resolver: Arc<PathResolver>,
        publisher: Arc<dyn SyncPublisher>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            points,
            items,
            resolver,
            publisher,
            meta: MetaCache::new(),
            active: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn begin_request(&self) -> RequestScope {
        RequestScope::begin(self.config.sync_limit)
    }

    /// Idempotent create-or-update: a point is created once per
    /// canonical prefix, and `version` is refreshed whenever it
    /// differs from the stored value. Calling this twice with the
    /// same URL never creates a duplicate.
    pub async fn register_cache_path(
        &self,
        url: &str,
        source_path: &str,
        version: &str,
    ) -> Result<CachePointRecord, AppError> {
        let url_prefix = canonicalize(url)
            .ok_or_else(|| DomainError::validation(format!("`{url}` is not an absolute URL")))?;
        let key = key_name(url)
            .ok_or_else(|| DomainError::validation(format!("`{url}` is not an absolute URL")))?;

        if let Some(existing) = self.points.find_point_by_key(&key).await? {
            self.meta.prime_point(existing.id, existing.meta.clone());
            let changed = self
                .meta
                .with_point_mut(existing.id, |meta| meta.set_version(version))
                .unwrap_or(false);
            if changed {
                let meta = self
                    .meta
                    .point(existing.id)
                    .ok_or_else(|| DomainError::invariant("point meta vanished during register"))?;
                self.points
                    .save_point_meta(&[(existing.id, meta.clone())])
                    .await?;
                debug!(
                    target = "application::registry",
                    prefix = %url_prefix,
                    version,
                    "cache point version refreshed"
                );
                return Ok(CachePointRecord { meta, ..existing });
            }
            return Ok(existing);
        }

        let created = self
            .points
            .create_point(CreateCachePointParams {
                url_prefix: url_prefix.clone(),
                key_name: key,
                source_path: source_path.to_string(),
                meta: PointMeta::with_version(version),
            })
            .await?;
        self.meta.prime_point(created.id, created.meta.clone());
        info!(
            target = "application::registry",
            prefix = %url_prefix,
            version,
            "cache point registered"
        );
        Ok(created)
    }

    /// Move a registered point into the active set, priming its
    /// metadata into the process-local cache. Activation order is
    /// resolution precedence.
    pub async fn activate_cache_point(&self, url: &str) -> Result<Uuid, AppError> {
        let key = key_name(url)
            .ok_or_else(|| DomainError::validation(format!("`{url}` is not an absolute URL")))?;
        let point = self
            .points
            .find_point_by_key(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("cache point"))?;
        if !point.status.is_enabled() {
            return Err(DomainError::validation(format!(
                "cache point `{}` is disabled",
                point.url_prefix
            ))
            .into());
        }

        self.meta.prime_point(point.id, point.meta.clone());

        let mut active = self.active.write().unwrap();
        if !active.iter().any(|entry| entry.id == point.id) {
            active.push(ActivePoint {
                id: point.id,
                url_prefix: point.url_prefix.clone(),
            });
        }
        Ok(point.id)
    }

    pub fn get_active_cache_points(&self) -> Vec<ActivePoint> {
        self.active.read().unwrap().clone()
    }

    pub fn active_point_ids(&self) -> Vec<Uuid> {
        self.active
            .read()
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.active.read().unwrap().iter().any(|entry| entry.id == id)
    }

    /// First active point whose prefix matches the URL, in activation
    /// order. No longest-prefix logic: when two active prefixes both
    /// match, the earlier activation wins.
    pub(crate) fn owning_point(&self, url: &str) -> Option<ActivePoint> {
        self.active
            .read()
            .unwrap()
            .iter()
            .find(|entry| under_prefix(url, &entry.url_prefix))
            .cloned()
    }

    /// True iff some active point owns the URL and the URL is not in
    /// that point's exclusion set. An exclusion under the owning
    /// point is final; no fallback to a later match. An evicted point
    /// blob is re-read from storage; a URL whose point cannot be read
    /// is reported uncacheable.
    pub async fn can_cache_url(&self, url: &str) -> bool {
        let Some(base) = clean_url(url) else {
            return false;
        };
        let Some(point) = self.owning_point(url) else {
            return false;
        };
        if self.meta.point(point.id).is_none() && self.load_point_meta(point.id).await.is_err() {
            return false;
        }
        match self.meta.point(point.id) {
            Some(meta) => !meta.is_excluded(&base),
            None => false,
        }
    }

    /// Permanently opt a URL out of caching under a point. Idempotent.
    pub async fn exclude_url(&self, point_id: Uuid, url: &str) -> Result<(), AppError> {
        let base = clean_url(url)
            .ok_or_else(|| DomainError::validation(format!("`{url}` is not an absolute URL")))?;
        self.load_point_meta(point_id).await?;
        self.meta.with_point_mut(point_id, |meta| meta.exclude(base));
        self.persist_point_meta(point_id).await
    }

    /// Remove an exclusion; no-op when absent.
    pub async fn remove_excluded_url(&self, point_id: Uuid, url: &str) -> Result<(), AppError> {
        let base = clean_url(url)
            .ok_or_else(|| DomainError::validation(format!("`{url}` is not an absolute URL")))?;
        self.load_point_meta(point_id).await?;
        let removed = self
            .meta
            .with_point_mut(point_id, |meta| meta.remove_exclusion(&base))
            .unwrap_or(false);
        if removed {
            self.persist_point_meta(point_id).await?;
        }
        Ok(())
    }

    /// Clear cached mappings on a point and every item under it.
    /// Records survive; exclusions survive; percent-complete resets.
    pub async fn purge_cache(&self, point_id: Uuid) -> Result<u64, AppError> {
        let point = self
            .points
            .find_point(point_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let items = self.items.list_point_items(point_id).await?;
        let mut updates = Vec::with_capacity(items.len());
        for item in items {
            let snapshot = self.meta.item(item.id);
            let mut meta = snapshot.clone().unwrap_or_else(|| item.meta.clone());
            meta.reset();
            let installed = match snapshot {
                Some(expected) => self.meta.replace_item_if(item.id, &expected, meta.clone()),
                None => {
                    self.meta.replace_item(item.id, meta.clone());
                    true
                }
            };
            if !installed {
                // An interleaved writer mutated the cached copy; drop
                // it so the next resolution re-reads the reset record.
                self.meta.evict_item(item.id);
            }
            updates.push((item.id, meta));
        }
        let cleared = updates.len() as u64;
        if !updates.is_empty() {
            self.items.save_item_meta(&updates).await?;
        }

        self.meta.prime_point(point_id, point.meta.clone());
        self.meta.with_point_mut(point_id, |meta| meta.clear_cached());
        self.persist_point_meta(point_id).await?;

        info!(
            target = "application::registry",
            prefix = %point.url_prefix,
            items = cleared,
            "cache point purged"
        );
        Ok(cleared)
    }

    /// Drop the in-process copy of an item's metadata so the next
    /// resolution re-reads storage. Called when the remote service
    /// reports a completed sync out of band.
    pub fn invalidate_item(&self, item_id: i64) {
        self.meta.evict_item(item_id);
    }

    /// Point-level counterpart of [`Self::invalidate_item`]. The next
    /// operation touching the point re-primes it from storage.
    pub fn invalidate_point(&self, point_id: Uuid) {
        self.meta.evict_point(point_id);
    }

    /// Enable or disable a registered point. Disabling removes it
    /// from the active set but keeps the record and its children.
    pub async fn set_point_status(
        &self,
        point_id: Uuid,
        status: RecordStatus,
    ) -> Result<(), AppError> {
        self.points.update_point_status(point_id, status).await?;
        if !status.is_enabled() {
            let mut active = self.active.write().unwrap();
            active.retain(|entry| entry.id != point_id);
        }
        Ok(())
    }

    /// End-of-request flush: persist every dirty metadata blob once
    /// (batched), then issue at most one publish call for the queued
    /// items. Publish failures are recorded as `upload_error` on the
    /// affected items and never fail the request.
    pub async fn finish_request(&self, mut scope: RequestScope) -> Result<FlushReport, AppError> {
        let mut report = FlushReport::default();

        let point_updates: Vec<_> = scope
            .dirty_points()
            .filter_map(|id| self.meta.point(id).map(|meta| (id, meta)))
            .collect();
        if !point_updates.is_empty() {
            self.points.save_point_meta(&point_updates).await?;
            report.points_persisted = point_updates.len();
        }

        let item_updates: Vec<_> = scope
            .dirty_items()
            .filter_map(|id| self.meta.item(id).map(|meta| (id, meta)))
            .collect();
        if !item_updates.is_empty() {
            self.items.save_item_meta(&item_updates).await?;
            report.items_persisted = item_updates.len();
        }
        metrics::counter!("specchio_meta_flush_total").increment(1);

        let queued = scope.queued().to_vec();
        scope.mark_finished();
        drop(scope);

        if !queued.is_empty() {
            report.items_published = queued.len();
            let request = PublishRequest::upload_cache(queued.clone());
            if let Err(err) = self.publisher.publish(request).await {
                error!(
                    target = "application::registry",
                    error = %err,
                    items = queued.len(),
                    "remote publish dispatch failed"
                );
                self.record_upload_errors(&queued, &err.to_string()).await?;
            }
        }

        Ok(report)
    }

    async fn record_upload_errors(&self, item_ids: &[i64], message: &str) -> Result<(), AppError> {
        let mut updates = Vec::with_capacity(item_ids.len());
        for &id in item_ids {
            let changed = self.meta.with_item_mut(id, |meta| {
                meta.upload_error = Some(message.to_string());
            });
            if changed.is_some() {
                if let Some(meta) = self.meta.item(id) {
                    updates.push((id, meta));
                }
            }
        }
        if !updates.is_empty() {
            self.items.save_item_meta(&updates).await?;
        }
        Ok(())
    }

    pub(crate) async fn load_point_meta(&self, point_id: Uuid) -> Result<(), AppError> {
        if self.meta.point(point_id).is_some() {
            return Ok(());
        }
        let point = self
            .points
            .find_point(point_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.meta.prime_point(point_id, point.meta);
        Ok(())
    }

    async fn persist_point_meta(&self, point_id: Uuid) -> Result<(), AppError> {
        let meta = self
            .meta
            .point(point_id)
            .ok_or_else(|| DomainError::invariant("point meta missing after load"))?;
        self.points
            .save_point_meta(&[(point_id, meta)])
            .await
            .map_err(AppError::from)
    }
}
