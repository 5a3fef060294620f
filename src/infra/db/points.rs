use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CachePointsRepo, CreateCachePointParams, RepoError},
    domain::{entities::CachePointRecord, meta::PointMeta, types::RecordStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const POINT_COLUMNS: &str =
    "id, url_prefix, key_name, source_path, status, meta, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PointRow {
    id: Uuid,
    url_prefix: String,
    key_name: String,
    source_path: String,
    status: RecordStatus,
    meta: JsonValue,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PointRow> for CachePointRecord {
    fn from(row: PointRow) -> Self {
        let meta = serde_json::from_value(row.meta).unwrap_or_default();
        Self {
            id: row.id,
            url_prefix: row.url_prefix,
            key_name: row.key_name,
            source_path: row.source_path,
            status: row.status,
            meta,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn meta_json(meta: &PointMeta) -> Result<JsonValue, RepoError> {
    serde_json::to_value(meta).map_err(RepoError::from_persistence)
}

#[async_trait]
impl CachePointsRepo for PostgresRepositories {
    async fn create_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError> {
        let meta = meta_json(&params.meta)?;
        let inserted = sqlx::query_as::<_, PointRow>(&format!(
            "INSERT INTO cache_points (id, url_prefix, key_name, source_path, meta) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (key_name) DO NOTHING \
             RETURNING {POINT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.url_prefix)
        .bind(&params.key_name)
        .bind(&params.source_path)
        .bind(meta)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match inserted {
            Some(row) => Ok(row.into()),
            // Lost the insert race; the existing record wins.
            None => self
                .find_point_by_key(&params.key_name)
                .await?
                .ok_or_else(|| RepoError::Integrity {
                    message: format!(
                        "cache point `{}` conflicted but is not readable",
                        params.key_name
                    ),
                }),
        }
    }

    async fn find_point(&self, id: Uuid) -> Result<Option<CachePointRecord>, RepoError> {
        let row = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS} FROM cache_points WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CachePointRecord::from))
    }

    async fn find_point_by_key(
        &self,
        key_name: &str,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        let row = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS} FROM cache_points WHERE key_name = $1"
        ))
        .bind(key_name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CachePointRecord::from))
    }

    async fn list_points(&self) -> Result<Vec<CachePointRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS} FROM cache_points ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CachePointRecord::from).collect())
    }

    async fn update_point_status(&self, id: Uuid, status: RecordStatus) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE cache_points SET status = $1, updated_at = now() WHERE id = $2")
                .bind(status)
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn save_point_meta(&self, updates: &[(Uuid, PointMeta)]) -> Result<(), RepoError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        for (id, meta) in updates {
            let meta = meta_json(meta)?;
            sqlx::query("UPDATE cache_points SET meta = $1, updated_at = now() WHERE id = $2")
                .bind(meta)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
