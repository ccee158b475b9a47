//! Policy adapter backed by the `role_policy` table

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::PgPool;
use tracing::debug;

use super::PolicyAdapter;
use crate::models::Policy;

#[derive(Clone)]
pub struct PgPolicyAdapter {
    pool: PgPool,
}

impl PgPolicyAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyAdapter for PgPolicyAdapter {
    async fn load(&self) -> DatabaseResult<Vec<Policy>> {
        let policies = sqlx::query_as::<_, Policy>(
            "SELECT subject, object, action FROM role_policy ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(policies)
    }

    async fn add(&self, policies: &[Policy]) -> DatabaseResult<()> {
        if policies.is_empty() {
            return Ok(());
        }
        debug!("Persisting {} policies", policies.len());
        let mut tx = self.pool.begin().await?;
        for policy in policies {
            sqlx::query(
                r#"
                INSERT INTO role_policy (subject, object, action)
                VALUES ($1, $2, $3)
                ON CONFLICT (subject, object, action) DO NOTHING
                "#,
            )
            .bind(&policy.subject)
            .bind(&policy.object)
            .bind(&policy.action)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, policies: &[Policy]) -> DatabaseResult<()> {
        if policies.is_empty() {
            return Ok(());
        }
        debug!("Removing {} policies", policies.len());
        let mut tx = self.pool.begin().await?;
        for policy in policies {
            sqlx::query("DELETE FROM role_policy WHERE subject = $1 AND object = $2 AND action = $3")
                .bind(&policy.subject)
                .bind(&policy.object)
                .bind(&policy.action)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
