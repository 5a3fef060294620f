//! The resolution algorithm behind `get_cached_urls`.
//!
//! Given a batch of raw URLs from the rendering pipeline, map each to
//! its previously cached remote equivalent where one exists, and
//! schedule bounded background work for everything stale or unseen.
//! Resolution is called inline during page rendering and must never
//! fail the page: unresolvable inputs fold into exclusions or no-op
//! outcomes instead of errors.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::registry::CacheRegistry;
use crate::application::repos::CreateCacheItemParams;
use crate::application::scope::RequestScope;
use crate::domain::meta::{Freshness, ItemMeta};
use crate::domain::url::{clean_url, key_name, with_version_tag};

struct Candidate {
    raw: String,
    tagged: String,
    base: String,
    key: String,
    point_id: Uuid,
}

impl CacheRegistry {
    /// Resolve a batch of raw URLs to their cached equivalents.
    ///
    /// The returned map contains only actionable replacements: a URL
    /// that is uncacheable, excluded, pending, or newly scheduled is
    /// absent from the result. Work scheduled here stays buffered on
    /// `scope` until `finish_request`.
    pub async fn get_cached_urls(
        &self,
        scope: &mut RequestScope,
        urls: &[String],
    ) -> Result<HashMap<String, String>, AppError> {
        let mut results: HashMap<String, String> = HashMap::new();
        let mut pending: Vec<Candidate> = Vec::new();

        for raw in urls {
            // Step 1: only URLs under an active, non-excluded point
            // survive.
            let Some(base) = clean_url(raw) else {
                continue;
            };
            let Some(point) = self.owning_point(raw) else {
                continue;
            };
            // Active points are primed at activation; a miss here
            // means the copy was invalidated out of band.
            let point_meta = match self.meta.point(point.id) {
                Some(meta) => meta,
                None => {
                    self.load_point_meta(point.id).await?;
                    match self.meta.point(point.id) {
                        Some(meta) => meta,
                        None => continue,
                    }
                }
            };
            if point_meta.is_excluded(&base) {
                continue;
            }

            // Step 2: version-tag so a content version bump
            // invalidates previous variants without touching records.
            let Some(tagged) = with_version_tag(raw, &point_meta.version) else {
                continue;
            };

            // Step 3: one variant per canonical base per call.
            if !scope.first_sighting(&base) {
                continue;
            }

            // Step 4: point-level pre-cache short-circuit.
            if let Some(value) = point_meta.cached_value(&tagged) {
                metrics::counter!("specchio_resolve_hit_total").increment(1);
                results.insert(raw.clone(), value.to_string());
                continue;
            }

            let Some(key) = key_name(&base) else {
                continue;
            };
            pending.push(Candidate {
                raw: raw.clone(),
                tagged,
                base,
                key,
                point_id: point.id,
            });
        }

        if !pending.is_empty() {
            let matched = self.lookup_items(&pending).await?;
            for (index, candidate) in pending.iter().enumerate() {
                match matched.get(&index) {
                    Some(&(item_id, enabled)) => {
                        if enabled {
                            self.check_item(scope, candidate, item_id, &mut results);
                        }
                    }
                    None => self.prepare_cache(scope, candidate).await?,
                }
            }
        }

        // Step 7: identity mappings mean "still local"; callers only
        // want replacements.
        results.retain(|raw, value| raw != value);
        debug!(
            target = "application::resolve",
            requested = urls.len(),
            resolved = results.len(),
            queued = scope.queued().len(),
            "resolution batch complete"
        );
        Ok(results)
    }

    /// Step 5 lookup: batch the index query per owning point and
    /// prime item metadata into the process-local cache. Returns
    /// candidate index -> (item id, enabled).
    async fn lookup_items(
        &self,
        pending: &[Candidate],
    ) -> Result<HashMap<usize, (i64, bool)>, AppError> {
        let mut by_point: HashMap<Uuid, Vec<usize>> = HashMap::new();
        for (index, candidate) in pending.iter().enumerate() {
            by_point.entry(candidate.point_id).or_default().push(index);
        }

        let mut matched = HashMap::new();
        for (point_id, indexes) in by_point {
            let keys: Vec<String> = indexes
                .iter()
                .map(|&index| pending[index].key.clone())
                .collect();
            let found = self.items.find_items_by_keys(point_id, &keys).await?;
            for item in found {
                let Some(&index) = indexes
                    .iter()
                    .find(|&&index| pending[index].key == item.key_name)
                else {
                    continue;
                };
                self.meta.prime_item(item.id, item.meta.clone());
                matched.insert(index, (item.id, item.status.is_enabled()));
            }
        }
        Ok(matched)
    }

    /// Freshness check for one existing item (step 5). Fresh entries
    /// resolve from the stored mapping; stale entries are marked
    /// attempted immediately and queued, so a second lookup in the
    /// same request sees them as pending.
    fn check_item(
        &self,
        scope: &mut RequestScope,
        candidate: &Candidate,
        item_id: i64,
        results: &mut HashMap<String, String>,
    ) {
        let verdict = self
            .meta
            .item(item_id)
            .map(|meta| meta.freshness(&candidate.tagged, scope.now(), self.config.freshness_ttl));
        match verdict {
            Some(Freshness::Resolved(value)) => {
                metrics::counter!("specchio_resolve_hit_total").increment(1);
                let primed = self
                    .meta
                    .with_point_mut(candidate.point_id, |meta| {
                        meta.record_cached(&candidate.tagged, &value)
                    })
                    .unwrap_or(false);
                if primed {
                    scope.mark_point_dirty(candidate.point_id);
                }
                results.insert(candidate.raw.clone(), value);
            }
            Some(Freshness::Pending) | None => {}
            Some(Freshness::Stale) => {
                metrics::counter!("specchio_resolve_miss_total").increment(1);
                let now = scope.now();
                self.meta.with_item_mut(item_id, |meta| {
                    meta.mark_attempted(candidate.tagged.as_str(), now);
                });
                scope.mark_item_dirty(item_id);
                scope.prepare_for_sync(item_id);
            }
        }
    }

    /// Step 6: a canonical base with no item at all. Resolve the
    /// local file; a missing file permanently excludes the base under
    /// its owning point, otherwise create the item and queue it.
    async fn prepare_cache(
        &self,
        scope: &mut RequestScope,
        candidate: &Candidate,
    ) -> Result<(), AppError> {
        let Some(src_file) = self.resolver.url_to_path(&candidate.base) else {
            metrics::counter!("specchio_resolve_miss_total").increment(1);
            self.meta.with_point_mut(candidate.point_id, |meta| {
                meta.exclude(candidate.base.clone());
            });
            scope.mark_point_dirty(candidate.point_id);
            debug!(
                target = "application::resolve",
                url = %candidate.base,
                "no local file; URL permanently excluded"
            );
            return Ok(());
        };

        let mut meta = ItemMeta::new(src_file.display().to_string(), scope.now());
        meta.mark_attempted(candidate.tagged.clone(), scope.now());

        let item = self
            .items
            .create_item(CreateCacheItemParams {
                point_id: candidate.point_id,
                base_url: candidate.base.clone(),
                key_name: candidate.key.clone(),
                meta,
            })
            .await?;

        // create_item is conflict-then-fetch: a concurrent request
        // may have inserted the row first, so prime with whatever was
        // stored and re-mark the variant on the cached copy.
        self.meta.prime_item(item.id, item.meta.clone());
        let now = scope.now();
        self.meta.with_item_mut(item.id, |meta| {
            meta.mark_attempted(candidate.tagged.clone(), now);
        });
        scope.mark_item_dirty(item.id);
        scope.prepare_for_sync(item.id);
        Ok(())
    }
}
