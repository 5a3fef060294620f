//! Request and response types for the Specchio admin API.
//!
//! These types are shared between the server and external admin
//! clients. They carry no persistence concerns; the server converts
//! between these DTOs and its domain records at the HTTP boundary.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Item status as exposed over the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Enabled,
    Disabled,
}

/// One cached-asset record as listed by the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    pub id: i64,
    pub point_id: Uuid,
    pub base_url: String,
    /// The remote URL the asset currently resolves to, when any
    /// variant has completed a round trip through the remote service.
    pub resolved_url: Option<String>,
    pub status: ItemStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub upload_error: Option<String>,
}

/// Paginated listing of cached items under a cache point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub items: Vec<CachedItem>,
    pub total: u64,
    pub total_pages: u32,
    pub current_page: u32,
    pub nav_text: String,
}

/// Bulk state-change request. `state` is one of `enabled`,
/// `disabled`, or the `delete` sentinel which resets an item for
/// re-evaluation instead of removing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStateRequest {
    pub ids: Vec<i64>,
    pub state: String,
}

/// Per-item outcome of a bulk state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeOutcome {
    pub id: i64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStateResponse {
    pub results: Vec<StateChangeOutcome>,
}

/// Purge request; omitting `point_id` purges every registered point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeRequest {
    pub point_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub points_purged: u64,
    pub items_cleared: u64,
}

/// Single-item metadata edit. `reset` clears the cached mapping so
/// the next resolution re-evaluates the asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub status: Option<ItemStatus>,
    pub reset: Option<bool>,
}

/// A registered cache point as exposed to the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePointSummary {
    pub id: Uuid,
    pub url_prefix: String,
    pub source_path: String,
    pub version: String,
    pub active: bool,
    pub total_items: u64,
    pub percent_complete: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointListResponse {
    pub points: Vec<CachePointSummary>,
}
