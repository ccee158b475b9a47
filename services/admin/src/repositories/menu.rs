//! Menu repository for database operations

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::PgPool;
use tracing::info;

use super::MenuRepository;
use crate::models::{Menu, NewMenu};

const MENU_COLUMNS: &str = "id, name, title, icon, path, redirect, component, sort, status, \
                            hidden, parent_id, creator, created_at, updated_at";

/// Menu repository
#[derive(Clone)]
pub struct PgMenuRepository {
    pool: PgPool,
}

impl PgMenuRepository {
    /// Create a new menu repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuRepository for PgMenuRepository {
    async fn list(&self) -> DatabaseResult<Vec<Menu>> {
        let menus = sqlx::query_as::<_, Menu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menu ORDER BY sort, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(menus)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Menu>> {
        let menus = sqlx::query_as::<_, Menu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menu WHERE id = ANY($1) ORDER BY sort, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(menus)
    }

    async fn for_roles(&self, role_ids: &[i64]) -> DatabaseResult<Vec<Menu>> {
        let menus = sqlx::query_as::<_, Menu>(&format!(
            r#"
            SELECT {MENU_COLUMNS} FROM menu
            WHERE status = 1
              AND id IN (SELECT menu_id FROM role_menu WHERE role_id = ANY($1))
            ORDER BY sort, id
            "#
        ))
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(menus)
    }

    async fn create(&self, menu: &NewMenu) -> DatabaseResult<Menu> {
        info!("Creating new menu: {}", menu.name);
        let menu = sqlx::query_as::<_, Menu>(&format!(
            r#"
            INSERT INTO menu (name, title, icon, path, redirect, component, sort, status, hidden, parent_id, creator)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(&menu.name)
        .bind(&menu.title)
        .bind(&menu.icon)
        .bind(&menu.path)
        .bind(&menu.redirect)
        .bind(&menu.component)
        .bind(menu.sort)
        .bind(i16::from(menu.status))
        .bind(menu.hidden)
        .bind(menu.parent_id)
        .bind(&menu.creator)
        .fetch_one(&self.pool)
        .await?;
        Ok(menu)
    }

    async fn update(&self, id: i64, menu: &NewMenu) -> DatabaseResult<Option<Menu>> {
        info!("Updating menu {}", id);
        let menu = sqlx::query_as::<_, Menu>(&format!(
            r#"
            UPDATE menu
            SET name = $2, title = $3, icon = $4, path = $5, redirect = $6, component = $7,
                sort = $8, status = $9, hidden = $10, parent_id = $11, updated_at = NOW()
            WHERE id = $1
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&menu.name)
        .bind(&menu.title)
        .bind(&menu.icon)
        .bind(&menu.path)
        .bind(&menu.redirect)
        .bind(&menu.component)
        .bind(menu.sort)
        .bind(i16::from(menu.status))
        .bind(menu.hidden)
        .bind(menu.parent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(menu)
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        info!("Deleting menus {:?}", ids);
        sqlx::query("DELETE FROM menu WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
