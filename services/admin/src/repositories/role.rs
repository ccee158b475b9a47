//! Role repository for database operations

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::RoleRepository;
use crate::models::{NewRole, Role, RoleQuery, RoleUpdate};

const ROLE_COLUMNS: &str =
    "id, name, keyword, description, status, sort, creator, created_at, updated_at";

/// Role repository
#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    /// Create a new role repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &RoleQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(name) = query.name.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND name LIKE ").push_bind(format!("%{name}%"));
    }
    if let Some(keyword) = query.keyword.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND keyword LIKE ").push_bind(format!("%{keyword}%"));
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM role WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM role WHERE id = ANY($1) ORDER BY sort, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn find_by_keyword(&self, keyword: &str) -> DatabaseResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM role WHERE keyword = $1"
        ))
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn list(&self, query: &RoleQuery) -> DatabaseResult<(Vec<Role>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM role");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ROLE_COLUMNS} FROM role"));
        push_filters(&mut select, query);
        select.push(" ORDER BY sort, id");
        if let Some((offset, limit)) = query.page().window() {
            select.push(" LIMIT ").push_bind(limit);
            select.push(" OFFSET ").push_bind(offset);
        }
        let roles = select.build_query_as::<Role>().fetch_all(&self.pool).await?;
        Ok((roles, total))
    }

    async fn create(&self, role: &NewRole) -> DatabaseResult<Role> {
        info!("Creating new role: {}", role.keyword);
        let role = sqlx::query_as::<_, Role>(&format!(
            r#"
            INSERT INTO role (name, keyword, description, status, sort, creator)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(&role.name)
        .bind(&role.keyword)
        .bind(&role.desc)
        .bind(i16::from(role.status))
        .bind(role.sort)
        .bind(&role.creator)
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    async fn update(&self, update: &RoleUpdate) -> DatabaseResult<Role> {
        info!("Updating role {}", update.id);
        let role = sqlx::query_as::<_, Role>(&format!(
            r#"
            UPDATE role
            SET name = $2, keyword = $3, description = $4, status = $5, sort = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(update.id)
        .bind(&update.name)
        .bind(&update.keyword)
        .bind(&update.desc)
        .bind(i16::from(update.status))
        .bind(update.sort)
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        info!("Deleting roles {:?}", ids);
        sqlx::query("DELETE FROM role WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn menu_ids(&self, role_id: i64) -> DatabaseResult<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT menu_id FROM role_menu WHERE role_id = $1 ORDER BY menu_id",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn set_menus(&self, role_id: i64, menu_ids: &[i64]) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM role_menu WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO role_menu (role_id, menu_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(menu_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
