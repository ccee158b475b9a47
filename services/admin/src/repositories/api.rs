//! Api descriptor repository for database operations

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::ApiRepository;
use crate::models::{Api, ApiQuery, NewApi};

const API_COLUMNS: &str = "id, method, path, category, description, creator, created_at, updated_at";

/// Api repository
#[derive(Clone)]
pub struct PgApiRepository {
    pool: PgPool,
}

impl PgApiRepository {
    /// Create a new api repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ApiQuery) {
    builder.push(" WHERE 1 = 1");
    for (column, value) in [
        ("method", &query.method),
        ("path", &query.path),
        ("category", &query.category),
        ("creator", &query.creator),
    ] {
        if let Some(value) = value.as_deref().filter(|s| !s.is_empty()) {
            builder
                .push(format!(" AND {column} LIKE "))
                .push_bind(format!("%{value}%"));
        }
    }
}

#[async_trait]
impl ApiRepository for PgApiRepository {
    async fn list(&self, query: &ApiQuery) -> DatabaseResult<(Vec<Api>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM api");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {API_COLUMNS} FROM api"));
        push_filters(&mut select, query);
        select.push(" ORDER BY category, id");
        if let Some((offset, limit)) = query.page().window() {
            select.push(" LIMIT ").push_bind(limit);
            select.push(" OFFSET ").push_bind(offset);
        }
        let apis = select.build_query_as::<Api>().fetch_all(&self.pool).await?;
        Ok((apis, total))
    }

    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Api>> {
        let api = sqlx::query_as::<_, Api>(&format!("SELECT {API_COLUMNS} FROM api WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(api)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Api>> {
        let apis = sqlx::query_as::<_, Api>(&format!(
            "SELECT {API_COLUMNS} FROM api WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(apis)
    }

    async fn find_by_route(&self, method: &str, path: &str) -> DatabaseResult<Option<Api>> {
        let api = sqlx::query_as::<_, Api>(&format!(
            "SELECT {API_COLUMNS} FROM api WHERE UPPER(method) = UPPER($1) AND LOWER(path) = LOWER($2)"
        ))
        .bind(method)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(api)
    }

    async fn create(&self, api: &NewApi) -> DatabaseResult<Api> {
        info!("Creating new api: {} {}", api.method, api.path);
        let api = sqlx::query_as::<_, Api>(&format!(
            r#"
            INSERT INTO api (method, path, category, description, creator)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {API_COLUMNS}
            "#
        ))
        .bind(&api.method)
        .bind(&api.path)
        .bind(&api.category)
        .bind(&api.desc)
        .bind(&api.creator)
        .fetch_one(&self.pool)
        .await?;
        Ok(api)
    }

    async fn update(&self, id: i64, api: &NewApi) -> DatabaseResult<Option<Api>> {
        info!("Updating api {}", id);
        let api = sqlx::query_as::<_, Api>(&format!(
            r#"
            UPDATE api
            SET method = $2, path = $3, category = $4, description = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {API_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&api.method)
        .bind(&api.path)
        .bind(&api.category)
        .bind(&api.desc)
        .fetch_optional(&self.pool)
        .await?;
        Ok(api)
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        info!("Deleting apis {:?}", ids);
        sqlx::query("DELETE FROM api WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
