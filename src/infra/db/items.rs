use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::{
        pagination::PageRequest,
        repos::{CacheItemsRepo, CreateCacheItemParams, ItemQueryFilter, RepoError},
    },
    domain::{entities::CacheItemRecord, meta::ItemMeta, types::RecordStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const ITEM_COLUMNS: &str =
    "id, point_id, base_url, key_name, status, meta, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    point_id: Uuid,
    base_url: String,
    key_name: String,
    status: RecordStatus,
    meta: JsonValue,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ItemRow> for CacheItemRecord {
    fn from(row: ItemRow) -> Self {
        let meta = serde_json::from_value(row.meta).unwrap_or_default();
        Self {
            id: row.id,
            point_id: row.point_id,
            base_url: row.base_url,
            key_name: row.key_name,
            status: row.status,
            meta,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn meta_json(meta: &ItemMeta) -> Result<JsonValue, RepoError> {
    serde_json::to_value(meta).map_err(RepoError::from_persistence)
}

fn apply_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q ItemQueryFilter) {
    if let Some(point_id) = filter.point_id {
        qb.push(" AND point_id = ");
        qb.push_bind(point_id);
        qb.push(' ');
    }

    if let Some(search) = filter.search.as_ref() {
        // Numeric terms address a single item by id; everything else
        // substring-matches the base URL or any cached mapping.
        match search.trim().parse::<i64>() {
            Ok(id) => {
                qb.push(" AND id = ");
                qb.push_bind(id);
                qb.push(' ');
            }
            Err(_) => {
                // Only resolved mappings are searchable; an attempt
                // marker (value still equal to its variant key) is not
                // a cached URL yet.
                let pattern = format!("%{search}%");
                qb.push(" AND (base_url ILIKE ");
                qb.push_bind(pattern.clone());
                qb.push(
                    " OR EXISTS (SELECT 1 FROM jsonb_each_text(meta->'cached_urls') AS kv(variant, cached) \
                     WHERE kv.cached <> kv.variant AND kv.cached ILIKE ",
                );
                qb.push_bind(pattern);
                qb.push(")) ");
            }
        }
    }
}

#[async_trait]
impl CacheItemsRepo for PostgresRepositories {
    async fn create_item(
        &self,
        params: CreateCacheItemParams,
    ) -> Result<CacheItemRecord, RepoError> {
        let meta = meta_json(&params.meta)?;
        let inserted = sqlx::query_as::<_, ItemRow>(&format!(
            "INSERT INTO cache_items (point_id, base_url, key_name, meta) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (key_name) DO NOTHING \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(params.point_id)
        .bind(&params.base_url)
        .bind(&params.key_name)
        .bind(meta)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match inserted {
            Some(row) => Ok(row.into()),
            // Lost the insert race; the existing record wins.
            None => {
                let row = sqlx::query_as::<_, ItemRow>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM cache_items WHERE key_name = $1"
                ))
                .bind(&params.key_name)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;
                row.map(CacheItemRecord::from)
                    .ok_or_else(|| RepoError::Integrity {
                        message: format!(
                            "cache item `{}` conflicted but is not readable",
                            params.key_name
                        ),
                    })
            }
        }
    }

    async fn find_item(&self, id: i64) -> Result<Option<CacheItemRecord>, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM cache_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CacheItemRecord::from))
    }

    async fn find_items_by_keys(
        &self,
        point_id: Uuid,
        key_names: &[String],
    ) -> Result<Vec<CacheItemRecord>, RepoError> {
        if key_names.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM cache_items \
             WHERE point_id = $1 AND key_name = ANY($2)"
        ))
        .bind(point_id)
        .bind(key_names)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CacheItemRecord::from).collect())
    }

    async fn list_point_items(&self, point_id: Uuid) -> Result<Vec<CacheItemRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM cache_items WHERE point_id = $1 ORDER BY id ASC"
        ))
        .bind(point_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CacheItemRecord::from).collect())
    }

    async fn list_items(
        &self,
        filter: &ItemQueryFilter,
        page: PageRequest,
    ) -> Result<(Vec<CacheItemRecord>, u64), RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ITEM_COLUMNS} FROM cache_items WHERE 1=1 "
        ));
        apply_filter(&mut qb, filter);
        qb.push(" ORDER BY id DESC LIMIT ");
        qb.push_bind(i64::from(page.per_page()));
        qb.push(" OFFSET ");
        qb.push_bind(page.offset() as i64);

        let rows = qb
            .build_query_as::<ItemRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM cache_items WHERE 1=1 ");
        apply_filter(&mut count_qb, filter);
        let count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok((
            rows.into_iter().map(CacheItemRecord::from).collect(),
            PostgresRepositories::convert_count(count)?,
        ))
    }

    async fn update_item_status(&self, id: i64, status: RecordStatus) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE cache_items SET status = $1, updated_at = now() WHERE id = $2")
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

    async fn save_item_meta(&self, updates: &[(i64, ItemMeta)]) -> Result<(), RepoError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        for (id, meta) in updates {
            let meta = meta_json(meta)?;
            sqlx::query("UPDATE cache_items SET meta = $1, updated_at = now() WHERE id = $2")
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
