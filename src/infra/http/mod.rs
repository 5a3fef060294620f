//! Admin HTTP surface: listing, bulk state changes, purges, and the
//! health probe.

pub mod error;
mod handlers;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};

use crate::application::admin::AdminCacheService;
use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

/// Database liveness probe behind a seam so router tests run without
/// a live pool.
#[async_trait]
pub trait DbHealth: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

#[async_trait]
impl DbHealth for PostgresRepositories {
    async fn ping(&self) -> Result<(), String> {
        self.health_check().await.map_err(|err| err.to_string())
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub admin: Arc<AdminCacheService>,
    pub health: Arc<dyn DbHealth>,
    pub page_size: u32,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/cache/items", get(handlers::list_items))
        .route("/admin/cache/items/state", post(handlers::set_items_state))
        .route("/admin/cache/items/{id}", patch(handlers::update_item))
        .route("/admin/cache/purge", post(handlers::purge))
        .route("/admin/cache/points", get(handlers::list_points))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}

fn db_health_response(result: Result<(), String>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(message) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                message,
            )
            .attach(&mut response);
            response
        }
    }
}
