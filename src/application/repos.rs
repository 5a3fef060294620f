//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, PaginationError};
use crate::domain::entities::{CacheItemRecord, CachePointRecord};
use crate::domain::meta::{ItemMeta, PointMeta};
use crate::domain::types::RecordStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateCachePointParams {
    pub url_prefix: String,
    pub key_name: String,
    pub source_path: String,
    pub meta: PointMeta,
}

#[derive(Debug, Clone)]
pub struct CreateCacheItemParams {
    pub point_id: Uuid,
    pub base_url: String,
    pub key_name: String,
    pub meta: ItemMeta,
}

/// Listing filter for the admin façade. A numeric `search` matches
/// the item id; anything else substring-matches the item's URLs.
#[derive(Debug, Clone, Default)]
pub struct ItemQueryFilter {
    pub point_id: Option<Uuid>,
    pub search: Option<String>,
}

#[async_trait]
pub trait CachePointsRepo: Send + Sync {
    /// Insert keyed by `key_name`; on conflict the existing record is
    /// fetched and returned instead (conflict-then-fetch).
    async fn create_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError>;

    async fn find_point(&self, id: Uuid) -> Result<Option<CachePointRecord>, RepoError>;

    async fn find_point_by_key(&self, key_name: &str)
    -> Result<Option<CachePointRecord>, RepoError>;

    async fn list_points(&self) -> Result<Vec<CachePointRecord>, RepoError>;

    async fn update_point_status(&self, id: Uuid, status: RecordStatus) -> Result<(), RepoError>;

    /// Batched metadata write; one round trip for all dirty points.
    async fn save_point_meta(&self, updates: &[(Uuid, PointMeta)]) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CacheItemsRepo: Send + Sync {
    /// Insert keyed by `key_name`; on conflict the existing record is
    /// fetched and returned instead (conflict-then-fetch).
    async fn create_item(
        &self,
        params: CreateCacheItemParams,
    ) -> Result<CacheItemRecord, RepoError>;

    async fn find_item(&self, id: i64) -> Result<Option<CacheItemRecord>, RepoError>;

    /// Batched lookup by existence key, scoped to one cache point.
    async fn find_items_by_keys(
        &self,
        point_id: Uuid,
        key_names: &[String],
    ) -> Result<Vec<CacheItemRecord>, RepoError>;

    /// All items under a point; used by purge and percent-complete
    /// bookkeeping.
    async fn list_point_items(&self, point_id: Uuid) -> Result<Vec<CacheItemRecord>, RepoError>;

    /// Paged listing for the admin façade, returning the page slice
    /// and the unpaged total.
    async fn list_items(
        &self,
        filter: &ItemQueryFilter,
        page: PageRequest,
    ) -> Result<(Vec<CacheItemRecord>, u64), RepoError>;

    async fn update_item_status(&self, id: i64, status: RecordStatus) -> Result<(), RepoError>;

    /// Batched metadata write; one round trip for all dirty items.
    async fn save_item_meta(&self, updates: &[(i64, ItemMeta)]) -> Result<(), RepoError>;
}
