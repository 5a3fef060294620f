//! In-memory repository fakes and fixtures shared by the integration
//! suites.
#![allow(dead_code)]

use std::fs;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

use specchio::application::pagination::PageRequest;
use specchio::application::registry::{CacheRegistry, RegistryConfig};
use specchio::application::repos::{
    CacheItemsRepo, CachePointsRepo, CreateCacheItemParams, CreateCachePointParams,
    ItemQueryFilter, RepoError,
};
use specchio::application::sync::{PublishError, PublishRequest, SyncPublisher};
use specchio::domain::entities::{CacheItemRecord, CachePointRecord};
use specchio::domain::meta::{ItemMeta, PointMeta};
use specchio::domain::types::{RecordStatus, RootKind};
use specchio::infra::fs::{PathResolver, RootMount};

pub const SITE: &str = "https://site.test/assets";

#[derive(Default)]
pub struct MemoryRepositories {
    points: Mutex<Vec<CachePointRecord>>,
    items: Mutex<Vec<CacheItemRecord>>,
    next_item_id: AtomicI64,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self {
            next_item_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn stored_item(&self, id: i64) -> Option<CacheItemRecord> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn stored_point(&self, id: Uuid) -> Option<CachePointRecord> {
        self.points
            .lock()
            .unwrap()
            .iter()
            .find(|point| point.id == id)
            .cloned()
    }
}

#[async_trait]
impl CachePointsRepo for MemoryRepositories {
    async fn create_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError> {
        let mut points = self.points.lock().unwrap();
        if let Some(existing) = points
            .iter()
            .find(|point| point.key_name == params.key_name)
        {
            return Ok(existing.clone());
        }
        let now = OffsetDateTime::now_utc();
        let record = CachePointRecord {
            id: Uuid::new_v4(),
            url_prefix: params.url_prefix,
            key_name: params.key_name,
            source_path: params.source_path,
            status: RecordStatus::Enabled,
            meta: params.meta,
            created_at: now,
            updated_at: now,
        };
        points.push(record.clone());
        Ok(record)
    }

    async fn find_point(&self, id: Uuid) -> Result<Option<CachePointRecord>, RepoError> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .iter()
            .find(|point| point.id == id)
            .cloned())
    }

    async fn find_point_by_key(
        &self,
        key_name: &str,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .iter()
            .find(|point| point.key_name == key_name)
            .cloned())
    }

    async fn list_points(&self) -> Result<Vec<CachePointRecord>, RepoError> {
        Ok(self.points.lock().unwrap().clone())
    }

    async fn update_point_status(&self, id: Uuid, status: RecordStatus) -> Result<(), RepoError> {
        let mut points = self.points.lock().unwrap();
        let point = points
            .iter_mut()
            .find(|point| point.id == id)
            .ok_or(RepoError::NotFound)?;
        point.status = status;
        Ok(())
    }

    async fn save_point_meta(&self, updates: &[(Uuid, PointMeta)]) -> Result<(), RepoError> {
        let mut points = self.points.lock().unwrap();
        for (id, meta) in updates {
            let point = points
                .iter_mut()
                .find(|point| point.id == *id)
                .ok_or(RepoError::NotFound)?;
            point.meta = meta.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl CacheItemsRepo for MemoryRepositories {
    async fn create_item(
        &self,
        params: CreateCacheItemParams,
    ) -> Result<CacheItemRecord, RepoError> {
        let mut items = self.items.lock().unwrap();
        if let Some(existing) = items.iter().find(|item| item.key_name == params.key_name) {
            return Ok(existing.clone());
        }
        let now = OffsetDateTime::now_utc();
        let record = CacheItemRecord {
            id: self.next_item_id.fetch_add(1, Ordering::SeqCst),
            point_id: params.point_id,
            base_url: params.base_url,
            key_name: params.key_name,
            status: RecordStatus::Enabled,
            meta: params.meta,
            created_at: now,
            updated_at: now,
        };
        items.push(record.clone());
        Ok(record)
    }

    async fn find_item(&self, id: i64) -> Result<Option<CacheItemRecord>, RepoError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned())
    }

    async fn find_items_by_keys(
        &self,
        point_id: Uuid,
        key_names: &[String],
    ) -> Result<Vec<CacheItemRecord>, RepoError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.point_id == point_id && key_names.contains(&item.key_name))
            .cloned()
            .collect())
    }

    async fn list_point_items(&self, point_id: Uuid) -> Result<Vec<CacheItemRecord>, RepoError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.point_id == point_id)
            .cloned()
            .collect())
    }

    async fn list_items(
        &self,
        filter: &ItemQueryFilter,
        page: PageRequest,
    ) -> Result<(Vec<CacheItemRecord>, u64), RepoError> {
        let items = self.items.lock().unwrap();
        let mut matched: Vec<CacheItemRecord> = items
            .iter()
            .filter(|item| {
                filter
                    .point_id
                    .is_none_or(|point_id| item.point_id == point_id)
            })
            .filter(|item| match filter.search.as_deref() {
                None => true,
                Some(term) => match term.trim().parse::<i64>() {
                    Ok(id) => item.id == id,
                    Err(_) => {
                        // Attempt markers (value == variant key) are
                        // not searchable mappings.
                        item.base_url.contains(term)
                            || item
                                .meta
                                .cached_urls
                                .iter()
                                .any(|(variant, value)| variant != value && value.contains(term))
                    }
                },
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));

        let total = matched.len() as u64;
        let slice = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page() as usize)
            .collect();
        Ok((slice, total))
    }

    async fn update_item_status(&self, id: i64, status: RecordStatus) -> Result<(), RepoError> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(RepoError::NotFound)?;
        item.status = status;
        Ok(())
    }

    async fn save_item_meta(&self, updates: &[(i64, ItemMeta)]) -> Result<(), RepoError> {
        let mut items = self.items.lock().unwrap();
        for (id, meta) in updates {
            let item = items
                .iter_mut()
                .find(|item| item.id == *id)
                .ok_or(RepoError::NotFound)?;
            item.meta = meta.clone();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<PublishRequest>>,
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(message.to_string())),
        }
    }

    pub fn calls(&self) -> Vec<PublishRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncPublisher for RecordingPublisher {
    async fn publish(&self, request: PublishRequest) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(request);
        match self.fail_with.lock().unwrap().clone() {
            Some(message) => Err(PublishError::Remote(message)),
            None => Ok(()),
        }
    }
}

/// A registered and activated cache point over a temp directory of
/// asset files.
pub struct Harness {
    pub registry: Arc<CacheRegistry>,
    pub repos: Arc<MemoryRepositories>,
    pub publisher: Arc<RecordingPublisher>,
    pub point_id: Uuid,
    _root: TempDir,
}

impl Harness {
    pub async fn new(files: &[&str]) -> Self {
        Self::build(files, RegistryConfig::default(), RecordingPublisher::new()).await
    }

    pub async fn with_sync_limit(files: &[&str], sync_limit: usize) -> Self {
        let config = RegistryConfig {
            sync_limit,
            ..RegistryConfig::default()
        };
        Self::build(files, config, RecordingPublisher::new()).await
    }

    pub async fn with_publisher(files: &[&str], publisher: RecordingPublisher) -> Self {
        Self::build(files, RegistryConfig::default(), publisher).await
    }

    async fn build(files: &[&str], config: RegistryConfig, publisher: RecordingPublisher) -> Self {
        let root = TempDir::new().expect("temp asset root");
        for file in files {
            let path = root.path().join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("asset subdirectory");
            }
            fs::write(&path, b"asset").expect("asset file");
        }

        let resolver = PathResolver::new(vec![RootMount {
            kind: RootKind::Code,
            url_prefix: SITE.to_string(),
            dir: root.path().to_path_buf(),
        }])
        .expect("path resolver");

        let repos = Arc::new(MemoryRepositories::new());
        let publisher = Arc::new(publisher);
        let registry = Arc::new(CacheRegistry::new(
            repos.clone(),
            repos.clone(),
            Arc::new(resolver),
            publisher.clone(),
            config,
        ));

        let point = registry
            .register_cache_path(SITE, "/srv/site/assets", "v1")
            .await
            .expect("register point");
        registry
            .activate_cache_point(SITE)
            .await
            .expect("activate point");

        Self {
            registry,
            repos,
            publisher,
            point_id: point.id,
            _root: root,
        }
    }

    pub fn url(file: &str) -> String {
        format!("{SITE}/{file}")
    }
}
