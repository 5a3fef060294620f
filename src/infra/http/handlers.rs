use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use specchio_api_types::{
    ItemListResponse, ItemStateRequest, ItemStateResponse, PointListResponse, PurgeRequest,
    UpdateItemRequest,
};

use crate::application::pagination::PageRequest;
use crate::application::repos::ItemQueryFilter;
use crate::domain::types::ItemStateChange;

use super::AdminState;
use super::error::{ApiError, app_error_to_api};

#[derive(Debug, Deserialize)]
pub struct ItemListQuery {
    pub point_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

pub async fn list_items(
    State(state): State<AdminState>,
    Query(query): Query<ItemListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::new(query.page.unwrap_or(1), state.page_size)
        .map_err(|err| ApiError::bad_request("invalid page", Some(err.to_string())))?;
    let filter = ItemQueryFilter {
        point_id: query.point_id,
        search: query.search.filter(|term| !term.trim().is_empty()),
    };

    let listing = state
        .admin
        .list_items(filter, page)
        .await
        .map_err(app_error_to_api)?;

    Ok(Json(ItemListResponse {
        items: listing.items,
        total: listing.total,
        total_pages: listing.total_pages,
        current_page: listing.current_page,
        nav_text: listing.nav_text,
    }))
}

pub async fn set_items_state(
    State(state): State<AdminState>,
    Json(payload): Json<ItemStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let change = ItemStateChange::try_from(payload.state.as_str()).map_err(|()| {
        ApiError::bad_request(
            "unknown state",
            Some(format!("`{}` is not a valid state", payload.state)),
        )
    })?;

    let results = state
        .admin
        .set_items_state(&payload.ids, change)
        .await
        .map_err(app_error_to_api)?;

    Ok(Json(ItemStateResponse { results }))
}

pub async fn update_item(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .admin
        .update_item(id, payload)
        .await
        .map_err(app_error_to_api)?;
    Ok(Json(item))
}

pub async fn purge(
    State(state): State<AdminState>,
    Json(payload): Json<PurgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .admin
        .purge(payload.point_id)
        .await
        .map_err(app_error_to_api)?;
    Ok(Json(response))
}

pub async fn list_points(
    State(state): State<AdminState>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state
        .admin
        .list_points()
        .await
        .map_err(app_error_to_api)?;
    Ok(Json(PointListResponse { points }))
}

pub async fn healthz(State(state): State<AdminState>) -> impl IntoResponse {
    super::db_health_response(state.health.ping().await)
}
