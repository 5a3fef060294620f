//! Process-local memoization of decoded metadata blobs.
//!
//! Decoded `PointMeta`/`ItemMeta` values are cached per record id so
//! repeated resolutions within and across requests skip the storage
//! decode. Mutations happen in place here and are persisted once per
//! request by the deferred flush (see `RequestScope`), never on every
//! field change.

use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::meta::{ItemMeta, PointMeta};

#[derive(Default)]
pub struct MetaCache {
    points: DashMap<Uuid, PointMeta>,
    items: DashMap<i64, ItemMeta>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from a freshly loaded record without clobbering
    /// an in-process copy that may already carry unflushed mutations.
    pub fn prime_point(&self, id: Uuid, meta: PointMeta) {
        self.points.entry(id).or_insert(meta);
    }

    pub fn prime_item(&self, id: i64, meta: ItemMeta) {
        self.items.entry(id).or_insert(meta);
    }

    pub fn point(&self, id: Uuid) -> Option<PointMeta> {
        self.points.get(&id).map(|entry| entry.clone())
    }

    pub fn item(&self, id: i64) -> Option<ItemMeta> {
        self.items.get(&id).map(|entry| entry.clone())
    }

    /// Mutate a point's blob in place. Returns the closure's result,
    /// or `None` when the id is not cached.
    pub fn with_point_mut<R>(&self, id: Uuid, f: impl FnOnce(&mut PointMeta) -> R) -> Option<R> {
        self.points.get_mut(&id).map(|mut entry| f(entry.value_mut()))
    }

    pub fn with_item_mut<R>(&self, id: i64, f: impl FnOnce(&mut ItemMeta) -> R) -> Option<R> {
        self.items.get_mut(&id).map(|mut entry| f(entry.value_mut()))
    }

    /// Install `meta` unconditionally (admin reset paths, where the
    /// operator's intent wins over any in-flight mutation).
    pub fn replace_item(&self, id: i64, meta: ItemMeta) {
        self.items.insert(id, meta);
    }

    /// Replace only if the cached value still equals `expected`;
    /// returns false when another path mutated it first.
    pub fn replace_item_if(&self, id: i64, expected: &ItemMeta, meta: ItemMeta) -> bool {
        match self.items.get_mut(&id) {
            Some(mut entry) if entry.value() == expected => {
                *entry.value_mut() = meta;
                true
            }
            _ => false,
        }
    }

    pub fn evict_point(&self, id: Uuid) {
        self.points.remove(&id);
    }

    pub fn evict_item(&self, id: i64) {
        self.items.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn prime_does_not_clobber_mutations() {
        let cache = MetaCache::new();
        let id = Uuid::new_v4();

        cache.prime_point(id, PointMeta::with_version("v1"));
        cache.with_point_mut(id, |meta| {
            meta.exclude("https://s/missing.png");
        });

        // A concurrent request loading the same record primes again.
        cache.prime_point(id, PointMeta::with_version("v1"));

        let meta = cache.point(id).expect("cached point");
        assert!(meta.is_excluded("https://s/missing.png"));
    }

    #[test]
    fn replace_if_detects_interleaved_writes() {
        let cache = MetaCache::new();
        let id = 7;
        let original = ItemMeta::new("/var/www/a.png", OffsetDateTime::UNIX_EPOCH);
        cache.prime_item(id, original.clone());

        let mut updated = original.clone();
        updated.upload_error = Some("boom".to_string());
        assert!(cache.replace_item_if(id, &original, updated.clone()));

        // A second swap against the stale snapshot must fail.
        let mut other = original.clone();
        other.upload_error = Some("other".to_string());
        assert!(!cache.replace_item_if(id, &original, other));

        assert_eq!(
            cache.item(id).expect("cached item").upload_error.as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn eviction_allows_a_fresh_prime() {
        let cache = MetaCache::new();
        let id = 7;
        let mut stale = ItemMeta::new("/var/www/a.png", OffsetDateTime::UNIX_EPOCH);
        stale.upload_error = Some("boom".to_string());
        cache.prime_item(id, stale);

        cache.evict_item(id);
        assert!(cache.item(id).is_none());

        cache.prime_item(id, ItemMeta::new("/var/www/a.png", OffsetDateTime::UNIX_EPOCH));
        let meta = cache.item(id).expect("cached item");
        assert!(meta.upload_error.is_none());
    }
}
