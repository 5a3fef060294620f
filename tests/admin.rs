//! Admin façade and router behavior over the in-memory fixtures.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use specchio::application::admin::AdminCacheService;
use specchio::application::pagination::PageRequest;
use specchio::application::repos::{CacheItemsRepo, ItemQueryFilter};
use specchio::domain::types::ItemStateChange;
use specchio::infra::http::{AdminState, DbHealth, build_admin_router};
use specchio_api_types::{ItemListResponse, ItemStatus, UpdateItemRequest};
use support::Harness;

async fn seed_items(harness: &Harness, files: &[&str]) -> Vec<i64> {
    let urls: Vec<String> = files.iter().map(|file| Harness::url(file)).collect();
    let mut scope = harness.registry.begin_request();
    harness
        .registry
        .get_cached_urls(&mut scope, &urls)
        .await
        .expect("resolution");
    let ids = scope.queued().to_vec();
    harness.registry.finish_request(scope).await.expect("flush");
    ids
}

async fn mark_resolved(harness: &Harness, item_id: i64, value: &str) {
    let mut meta = harness.repos.stored_item(item_id).expect("item").meta;
    let variant = meta.cached_urls.keys().next().expect("variant").clone();
    meta.cached_urls.insert(variant, value.to_string());
    harness
        .repos
        .save_item_meta(&[(item_id, meta)])
        .await
        .expect("seed mapping");
    harness.registry.invalidate_item(item_id);
}

#[tokio::test]
async fn listing_pages_and_reports_position() {
    let files = ["a.png", "b.png", "c.png", "d.png", "e.png"];
    let harness = Harness::new(&files).await;
    seed_items(&harness, &files).await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let page = admin
        .list_items(
            ItemQueryFilter::default(),
            PageRequest::new(2, 2).expect("page"),
        )
        .await
        .expect("listing");

    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.nav_text, "5 items, page 2 of 3");
}

#[tokio::test]
async fn numeric_search_matches_the_item_id() {
    let harness = Harness::new(&["a.png", "b.png"]).await;
    let ids = seed_items(&harness, &["a.png", "b.png"]).await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let page = admin
        .list_items(
            ItemQueryFilter {
                point_id: None,
                search: Some(ids[0].to_string()),
            },
            PageRequest::new(1, 20).expect("page"),
        )
        .await
        .expect("listing");

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, ids[0]);
}

#[tokio::test]
async fn text_search_matches_resolved_urls() {
    let harness = Harness::new(&["a.png", "b.png"]).await;
    let ids = seed_items(&harness, &["a.png", "b.png"]).await;
    mark_resolved(&harness, ids[0], "https://cdn.test/bucket-7/a.png").await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let page = admin
        .list_items(
            ItemQueryFilter {
                point_id: None,
                search: Some("bucket-7".to_string()),
            },
            PageRequest::new(1, 20).expect("page"),
        )
        .await
        .expect("listing");

    assert_eq!(page.total, 1);
    assert_eq!(
        page.items[0].resolved_url.as_deref(),
        Some("https://cdn.test/bucket-7/a.png")
    );
}

#[tokio::test]
async fn text_search_ignores_attempt_markers() {
    let harness = Harness::new(&["a.png", "b.png"]).await;
    let ids = seed_items(&harness, &["a.png", "b.png"]).await;
    mark_resolved(&harness, ids[0], "https://cdn.test/bucket-7/a.png").await;
    let admin = AdminCacheService::new(harness.registry.clone());

    // Every unresolved variant key carries the point version tag, but
    // a pending attempt is not a cached URL.
    let page = admin
        .list_items(
            ItemQueryFilter {
                point_id: None,
                search: Some("ver=v1".to_string()),
            },
            PageRequest::new(1, 20).expect("page"),
        )
        .await
        .expect("listing");

    assert_eq!(page.total, 0, "attempt markers must not be searchable");
}

#[tokio::test]
async fn bulk_state_change_reports_per_item_outcomes() {
    let harness = Harness::new(&["a.png"]).await;
    let ids = seed_items(&harness, &["a.png"]).await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let mut targets = ids.clone();
    targets.push(9999);
    let results = admin
        .set_items_state(&targets, ItemStateChange::Disable)
        .await
        .expect("bulk change");

    assert_eq!(results.len(), 2);
    assert!(results[0].ok);
    assert!(!results[1].ok, "missing id fails without aborting the batch");
    assert!(results[1].error.is_some());

    let stored = harness.repos.stored_item(ids[0]).expect("item");
    assert!(!stored.status.is_enabled());
}

#[tokio::test]
async fn delete_sentinel_resets_instead_of_removing() {
    let harness = Harness::new(&["a.png"]).await;
    let ids = seed_items(&harness, &["a.png"]).await;
    mark_resolved(&harness, ids[0], "https://cdn.test/a.png").await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let results = admin
        .set_items_state(&ids, ItemStateChange::Delete)
        .await
        .expect("delete");
    assert!(results[0].ok);

    let stored = harness.repos.stored_item(ids[0]).expect("record survives");
    assert!(stored.meta.cached_urls.is_empty());
    assert!(stored.status.is_enabled());
}

#[tokio::test]
async fn single_item_edit_can_reset_and_disable() {
    let harness = Harness::new(&["a.png"]).await;
    let ids = seed_items(&harness, &["a.png"]).await;
    mark_resolved(&harness, ids[0], "https://cdn.test/a.png").await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let item = admin
        .update_item(
            ids[0],
            UpdateItemRequest {
                status: Some(ItemStatus::Disabled),
                reset: Some(true),
            },
        )
        .await
        .expect("edit");

    assert_eq!(item.status, ItemStatus::Disabled);
    assert!(item.resolved_url.is_none());

    let stored = harness.repos.stored_item(ids[0]).expect("item");
    assert!(stored.meta.cached_urls.is_empty());
    assert!(!stored.status.is_enabled());
}

#[tokio::test]
async fn purge_without_point_clears_every_point() {
    let harness = Harness::new(&["a.png", "b.png"]).await;
    let ids = seed_items(&harness, &["a.png", "b.png"]).await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let response = admin.purge(None).await.expect("purge");
    assert_eq!(response.points_purged, 1);
    assert_eq!(response.items_cleared, 2);

    for id in ids {
        let stored = harness.repos.stored_item(id).expect("record survives");
        assert!(stored.meta.cached_urls.is_empty());
    }
}

#[tokio::test]
async fn point_listing_reports_completion() {
    let harness = Harness::new(&["a.png", "b.png"]).await;
    let ids = seed_items(&harness, &["a.png", "b.png"]).await;
    mark_resolved(&harness, ids[0], "https://cdn.test/a.png").await;
    let admin = AdminCacheService::new(harness.registry.clone());

    let points = admin.list_points().await.expect("points");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].total_items, 2);
    assert_eq!(points[0].percent_complete, Some(50));
    assert!(points[0].active);

    let stored = harness.repos.stored_point(harness.point_id).expect("point");
    assert_eq!(stored.meta.percent_complete, Some(50));
}

struct HealthyDb;

#[async_trait]
impl DbHealth for HealthyDb {
    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

fn admin_state(harness: &Harness) -> AdminState {
    AdminState {
        admin: Arc::new(AdminCacheService::new(harness.registry.clone())),
        health: Arc::new(HealthyDb),
        page_size: 20,
    }
}

#[tokio::test]
async fn health_endpoint_returns_no_content() {
    let harness = Harness::new(&[]).await;
    let router = build_admin_router(admin_state(&harness));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn item_listing_endpoint_serves_json() {
    let harness = Harness::new(&["a.png"]).await;
    seed_items(&harness, &["a.png"]).await;
    let router = build_admin_router(admin_state(&harness));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/cache/items?page=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let listing: ItemListResponse = serde_json::from_slice(&bytes).expect("listing body");
    assert_eq!(listing.total, 1);
    assert_eq!(listing.items[0].base_url, Harness::url("a.png"));
}

#[tokio::test]
async fn unknown_state_verb_is_a_bad_request() {
    let harness = Harness::new(&[]).await;
    let router = build_admin_router(admin_state(&harness));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/cache/items/state")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"ids":[1],"state":"obliterate"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("error body");
    assert_eq!(body["error"]["code"], "bad_request");
}
