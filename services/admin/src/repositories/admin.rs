//! Admin repository for database operations

use std::collections::HashMap;

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::info;

use super::AdminRepository;
use crate::models::{Admin, AdminQuery, AdminUpdate, NewAdmin, Role};

const ADMIN_COLUMNS: &str = "id, username, password, mobile, avatar, nickname, introduction, \
                             status, creator, created_at, updated_at";

/// Admin repository
#[derive(Clone)]
pub struct PgAdminRepository {
    pool: PgPool,
}

impl PgAdminRepository {
    /// Create a new admin repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach roles to each admin, roles ordered by rank
    async fn hydrate(&self, mut admins: Vec<Admin>) -> DatabaseResult<Vec<Admin>> {
        if admins.is_empty() {
            return Ok(admins);
        }
        let ids: Vec<i64> = admins.iter().map(|a| a.id).collect();

        let rows = sqlx::query(
            r#"
            SELECT ar.admin_id, r.id, r.name, r.keyword, r.description, r.status, r.sort,
                   r.creator, r.created_at, r.updated_at
            FROM role r
            JOIN admin_role ar ON ar.role_id = r.id
            WHERE ar.admin_id = ANY($1)
            ORDER BY r.sort, r.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_admin: HashMap<i64, Vec<Role>> = HashMap::new();
        for row in rows {
            let admin_id: i64 = row.get("admin_id");
            by_admin.entry(admin_id).or_default().push(Role::from_row(&row)?);
        }
        for admin in &mut admins {
            admin.roles = by_admin.remove(&admin.id).unwrap_or_default();
        }
        Ok(admins)
    }

    async fn hydrate_one(&self, admin: Option<Admin>) -> DatabaseResult<Option<Admin>> {
        match admin {
            Some(admin) => Ok(self.hydrate(vec![admin]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AdminQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(username) = query.username.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND username LIKE ").push_bind(format!("%{username}%"));
    }
    if let Some(nickname) = query.nickname.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND nickname LIKE ").push_bind(format!("%{nickname}%"));
    }
    if let Some(mobile) = query.mobile.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND mobile LIKE ").push_bind(format!("%{mobile}%"));
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl AdminRepository for PgAdminRepository {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate_one(admin).await
    }

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate_one(admin).await
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Admin>> {
        let admins = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(admins).await
    }

    async fn list(&self, query: &AdminQuery) -> DatabaseResult<(Vec<Admin>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM admin");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ADMIN_COLUMNS} FROM admin"));
        push_filters(&mut select, query);
        select.push(" ORDER BY id");
        if let Some((offset, limit)) = query.page().window() {
            select.push(" LIMIT ").push_bind(limit);
            select.push(" OFFSET ").push_bind(offset);
        }
        let admins = select.build_query_as::<Admin>().fetch_all(&self.pool).await?;

        Ok((self.hydrate(admins).await?, total))
    }

    async fn count(&self) -> DatabaseResult<i64> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM admin")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn create(&self, new_admin: &NewAdmin) -> DatabaseResult<Admin> {
        info!("Creating new admin: {}", new_admin.username);

        let mut tx = self.pool.begin().await?;
        let admin = sqlx::query_as::<_, Admin>(&format!(
            r#"
            INSERT INTO admin (username, password, mobile, avatar, nickname, introduction, status, creator)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(&new_admin.username)
        .bind(&new_admin.password)
        .bind(&new_admin.mobile)
        .bind(&new_admin.avatar)
        .bind(&new_admin.nickname)
        .bind(&new_admin.introduction)
        .bind(i16::from(new_admin.status))
        .bind(&new_admin.creator)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO admin_role (admin_id, role_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(admin.id)
        .bind(&new_admin.role_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.hydrate_one(Some(admin))
            .await?
            .ok_or(DatabaseError::Query(sqlx::Error::RowNotFound))
    }

    async fn update(&self, update: &AdminUpdate) -> DatabaseResult<Admin> {
        info!("Updating admin {}", update.id);

        let mut tx = self.pool.begin().await?;
        let admin = sqlx::query_as::<_, Admin>(&format!(
            r#"
            UPDATE admin
            SET username = $2, password = COALESCE($3, password), mobile = $4, avatar = $5,
                nickname = $6, introduction = $7, status = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(update.id)
        .bind(&update.username)
        .bind(&update.password)
        .bind(&update.mobile)
        .bind(&update.avatar)
        .bind(&update.nickname)
        .bind(&update.introduction)
        .bind(i16::from(update.status))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM admin_role WHERE admin_id = $1")
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO admin_role (admin_id, role_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(update.id)
        .bind(&update.role_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.hydrate_one(Some(admin))
            .await?
            .ok_or(DatabaseError::Query(sqlx::Error::RowNotFound))
    }

    async fn update_password(&self, username: &str, digest: &str) -> DatabaseResult<()> {
        sqlx::query("UPDATE admin SET password = $2, updated_at = NOW() WHERE username = $1")
            .bind(username)
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<Vec<String>> {
        info!("Deleting admins {:?}", ids);
        let usernames = sqlx::query_scalar("DELETE FROM admin WHERE id = ANY($1) RETURNING username")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(usernames)
    }
}
