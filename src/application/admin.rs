//! Admin façade over the cache registry: listing, bulk state changes,
//! metadata edits, and purges. Handlers in the HTTP layer stay thin
//! and delegate here.

use std::sync::Arc;

use specchio_api_types::{
    CachePointSummary, CachedItem, ItemStatus, PurgeResponse, StateChangeOutcome,
    UpdateItemRequest,
};
use tracing::info;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{PageRequest, PagedList};
use crate::application::registry::CacheRegistry;
use crate::application::repos::ItemQueryFilter;
use crate::domain::entities::CacheItemRecord;
use crate::domain::types::{ItemStateChange, RecordStatus};

pub struct AdminCacheService {
    registry: Arc<CacheRegistry>,
}

fn to_dto(record: &CacheItemRecord) -> CachedItem {
    CachedItem {
        id: record.id,
        point_id: record.point_id,
        base_url: record.base_url.clone(),
        resolved_url: record.meta.resolved_url().map(str::to_string),
        status: match record.status {
            RecordStatus::Enabled => ItemStatus::Enabled,
            RecordStatus::Disabled => ItemStatus::Disabled,
        },
        last_updated: record.meta.last_updated,
        upload_error: record.meta.upload_error.clone(),
    }
}

impl AdminCacheService {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// Paged item listing. A numeric search term matches the item id;
    /// any other term substring-matches the base or resolved URLs.
    pub async fn list_items(
        &self,
        filter: ItemQueryFilter,
        page: PageRequest,
    ) -> Result<PagedList<CachedItem>, AppError> {
        let (records, total) = self.registry.items.list_items(&filter, page).await?;
        let items = records.iter().map(to_dto).collect();
        Ok(PagedList::new(items, total, page))
    }

    /// Apply one state change to a batch of items. Failures are
    /// per-item; one missing id never aborts the rest of the batch.
    pub async fn set_items_state(
        &self,
        ids: &[i64],
        change: ItemStateChange,
    ) -> Result<Vec<StateChangeOutcome>, AppError> {
        if ids.is_empty() {
            return Err(AppError::validation("no item ids supplied"));
        }
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = self.apply_state_change(id, change).await;
            results.push(match outcome {
                Ok(()) => StateChangeOutcome {
                    id,
                    ok: true,
                    error: None,
                },
                Err(err) => StateChangeOutcome {
                    id,
                    ok: false,
                    error: Some(err.to_string()),
                },
            });
        }
        Ok(results)
    }

    async fn apply_state_change(&self, id: i64, change: ItemStateChange) -> Result<(), AppError> {
        match change {
            ItemStateChange::Enable => {
                self.registry
                    .items
                    .update_item_status(id, RecordStatus::Enabled)
                    .await?;
            }
            ItemStateChange::Disable => {
                self.registry
                    .items
                    .update_item_status(id, RecordStatus::Disabled)
                    .await?;
            }
            // "delete" resets the item for re-evaluation; the record
            // itself is kept so its history and id remain stable.
            ItemStateChange::Delete => {
                let item = self
                    .registry
                    .items
                    .find_item(id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                let mut meta = self.registry.meta.item(id).unwrap_or(item.meta);
                meta.reset();
                self.registry.meta.replace_item(id, meta.clone());
                self.registry.items.save_item_meta(&[(id, meta)]).await?;
                self.registry
                    .items
                    .update_item_status(id, RecordStatus::Enabled)
                    .await?;
            }
        }
        Ok(())
    }

    /// Edit one item: optional status flip and optional mapping reset.
    pub async fn update_item(
        &self,
        id: i64,
        request: UpdateItemRequest,
    ) -> Result<CachedItem, AppError> {
        let mut item = self
            .registry
            .items
            .find_item(id)
            .await?
            .ok_or(AppError::NotFound)?;

        if request.reset.unwrap_or(false) {
            let mut meta = self.registry.meta.item(id).unwrap_or(item.meta.clone());
            meta.reset();
            self.registry.meta.replace_item(id, meta.clone());
            self.registry.items.save_item_meta(&[(id, meta.clone())]).await?;
            item.meta = meta;
        }

        if let Some(status) = request.status {
            let status = match status {
                ItemStatus::Enabled => RecordStatus::Enabled,
                ItemStatus::Disabled => RecordStatus::Disabled,
            };
            self.registry.items.update_item_status(id, status).await?;
            item.status = status;
        }

        Ok(to_dto(&item))
    }

    /// Purge one point, or every registered point when `point_id` is
    /// absent. Records and exclusions survive; cached mappings do not.
    pub async fn purge(&self, point_id: Option<Uuid>) -> Result<PurgeResponse, AppError> {
        let targets = match point_id {
            Some(id) => vec![id],
            None => self
                .registry
                .points
                .list_points()
                .await?
                .into_iter()
                .map(|point| point.id)
                .collect(),
        };

        let mut response = PurgeResponse {
            points_purged: 0,
            items_cleared: 0,
        };
        for id in targets {
            response.items_cleared += self.registry.purge_cache(id).await?;
            response.points_purged += 1;
        }
        info!(
            target = "application::admin",
            points = response.points_purged,
            items = response.items_cleared,
            "admin purge complete"
        );
        Ok(response)
    }

    /// Every registered point with its completion ratio. The ratio is
    /// recomputed from the items on each call and written back onto
    /// the point metadata when it moved.
    pub async fn list_points(&self) -> Result<Vec<CachePointSummary>, AppError> {
        let points = self.registry.points.list_points().await?;
        let mut summaries = Vec::with_capacity(points.len());
        for point in points {
            let items = self.registry.items.list_point_items(point.id).await?;
            let total = items.len() as u64;
            let resolved = items.iter().filter(|item| item.meta.has_resolved()).count() as u64;
            let percent = if total == 0 {
                None
            } else {
                Some((resolved * 100 / total) as u8)
            };

            self.registry.meta.prime_point(point.id, point.meta.clone());
            let changed = self
                .registry
                .meta
                .with_point_mut(point.id, |meta| {
                    let moved = meta.percent_complete != percent;
                    meta.percent_complete = percent;
                    moved
                })
                .unwrap_or(false);
            if changed {
                if let Some(meta) = self.registry.meta.point(point.id) {
                    self.registry
                        .points
                        .save_point_meta(&[(point.id, meta)])
                        .await?;
                }
            }

            let version = self
                .registry
                .meta
                .point(point.id)
                .map(|meta| meta.version)
                .unwrap_or_else(|| point.meta.version.clone());
            summaries.push(CachePointSummary {
                id: point.id,
                url_prefix: point.url_prefix,
                source_path: point.source_path,
                version,
                active: self.registry.is_active(point.id),
                total_items: total,
                percent_complete: percent,
            });
        }
        Ok(summaries)
    }
}
