//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    meta::{ItemMeta, PointMeta},
    types::RecordStatus,
};

/// A registered root mapping from a public URL prefix to a local
/// source directory, versioned. Only enabled points answer
/// resolution queries; disabled points stay registered so their
/// children survive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachePointRecord {
    pub id: Uuid,
    /// Canonical URL prefix, trailing-slash normalized. Unique among
    /// registered points via `key_name`.
    pub url_prefix: String,
    pub key_name: String,
    /// Local filesystem path this prefix maps to, relative to a
    /// known root.
    pub source_path: String,
    pub status: RecordStatus,
    pub meta: PointMeta,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The cached-state record for one concrete asset URL under a cache
/// point. Created lazily on first resolution; cleared rather than
/// deleted on purge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheItemRecord {
    pub id: i64,
    pub point_id: Uuid,
    /// Canonical URL (no query or fragment) of the asset.
    pub base_url: String,
    pub key_name: String,
    pub status: RecordStatus,
    pub meta: ItemMeta,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
