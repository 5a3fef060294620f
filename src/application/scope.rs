//! Request-scoped resolution context.
//!
//! All per-request bookkeeping lives here instead of hidden static
//! state: the bounded sync queue, the dirty-metadata sets for the
//! deferred batch write, and the duplicate-base set. Callers create
//! one scope per inbound request and must finish it through
//! `CacheRegistry::finish_request`; a scope dropped with pending work
//! logs and discards it.

use std::collections::HashSet;

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_SYNC_LIMIT: usize = 100;

pub struct RequestScope {
    now: OffsetDateTime,
    sync_limit: usize,
    sync_queue: Vec<i64>,
    dirty_points: HashSet<Uuid>,
    dirty_items: HashSet<i64>,
    seen_bases: HashSet<String>,
    finished: bool,
}

impl RequestScope {
    pub fn begin(sync_limit: usize) -> Self {
        Self::begin_at(OffsetDateTime::now_utc(), sync_limit)
    }

    /// Construct a scope at an explicit instant. Tests use this to
    /// exercise the freshness window without waiting on wall time.
    pub fn begin_at(now: OffsetDateTime, sync_limit: usize) -> Self {
        Self {
            now,
            sync_limit,
            sync_queue: Vec::new(),
            dirty_points: HashSet::new(),
            dirty_items: HashSet::new(),
            seen_bases: HashSet::new(),
            finished: false,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Append an item to the sync queue while capacity remains.
    /// Returns false (and drops the push silently) once the limit is
    /// reached; the excess work is picked up by a later request.
    pub fn prepare_for_sync(&mut self, item_id: i64) -> bool {
        if self.sync_queue.contains(&item_id) {
            return true;
        }
        if self.sync_queue.len() >= self.sync_limit {
            metrics::counter!("specchio_sync_dropped_total").increment(1);
            return false;
        }
        self.sync_queue.push(item_id);
        metrics::counter!("specchio_sync_enqueued_total").increment(1);
        true
    }

    pub fn queued(&self) -> &[i64] {
        &self.sync_queue
    }

    /// Call-scoped duplicate suppression: true only the first time a
    /// canonical base URL is seen in this request.
    pub fn first_sighting(&mut self, base_url: &str) -> bool {
        self.seen_bases.insert(base_url.to_string())
    }

    pub fn mark_point_dirty(&mut self, id: Uuid) {
        self.dirty_points.insert(id);
    }

    pub fn mark_item_dirty(&mut self, id: i64) {
        self.dirty_items.insert(id);
    }

    pub fn dirty_points(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.dirty_points.iter().copied()
    }

    pub fn dirty_items(&self) -> impl Iterator<Item = i64> + '_ {
        self.dirty_items.iter().copied()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.sync_queue.is_empty() || !self.dirty_points.is_empty() || !self.dirty_items.is_empty()
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.finished && self.has_pending_work() {
            warn!(
                target = "application::scope",
                queued = self.sync_queue.len(),
                dirty_points = self.dirty_points.len(),
                dirty_items = self.dirty_items.len(),
                "request scope dropped without flush; buffered mutations discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_queue_is_capped() {
        let mut scope = RequestScope::begin(3);
        assert!(scope.prepare_for_sync(1));
        assert!(scope.prepare_for_sync(2));
        assert!(scope.prepare_for_sync(3));
        assert!(!scope.prepare_for_sync(4));
        assert_eq!(scope.queued(), &[1, 2, 3]);
        scope.mark_finished();
    }

    #[test]
    fn requeueing_a_queued_id_at_capacity_is_not_a_drop() {
        let mut scope = RequestScope::begin(2);
        assert!(scope.prepare_for_sync(1));
        assert!(scope.prepare_for_sync(2));
        assert!(scope.prepare_for_sync(1), "already-queued id stays accepted");
        assert!(!scope.prepare_for_sync(3));
        assert_eq!(scope.queued(), &[1, 2]);
        scope.mark_finished();
    }

    #[test]
    fn repeated_ids_enqueue_once() {
        let mut scope = RequestScope::begin(10);
        assert!(scope.prepare_for_sync(5));
        assert!(scope.prepare_for_sync(5));
        assert_eq!(scope.queued(), &[5]);
        scope.mark_finished();
    }

    #[test]
    fn duplicate_bases_are_suppressed() {
        let mut scope = RequestScope::begin(10);
        assert!(scope.first_sighting("https://s/a.png"));
        assert!(!scope.first_sighting("https://s/a.png"));
        assert!(scope.first_sighting("https://s/b.png"));
    }
}
