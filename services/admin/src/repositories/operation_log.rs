//! Operation log repository

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::OperationLogRepository;
use crate::models::{NewOperationLog, OperationLog, OperationLogQuery};

const LOG_COLUMNS: &str = "id, username, ip, method, path, description, status, start_time, \
                           time_cost, user_agent, created_at";

#[derive(Clone)]
pub struct PgOperationLogRepository {
    pool: PgPool,
}

impl PgOperationLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OperationLogQuery) {
    builder.push(" WHERE 1 = 1");
    for (column, value) in [
        ("username", &query.username),
        ("ip", &query.ip),
        ("path", &query.path),
    ] {
        if let Some(value) = value.as_deref().filter(|s| !s.is_empty()) {
            builder
                .push(format!(" AND {column} LIKE "))
                .push_bind(format!("%{value}%"));
        }
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl OperationLogRepository for PgOperationLogRepository {
    async fn insert(&self, log: &NewOperationLog) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_log
                (username, ip, method, path, description, status, start_time, time_cost, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&log.username)
        .bind(&log.ip)
        .bind(&log.method)
        .bind(&log.path)
        .bind(&log.desc)
        .bind(log.status)
        .bind(log.start_time)
        .bind(log.time_cost)
        .bind(&log.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, query: &OperationLogQuery) -> DatabaseResult<(Vec<OperationLog>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM operation_log");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {LOG_COLUMNS} FROM operation_log"));
        push_filters(&mut select, query);
        select.push(" ORDER BY id DESC");
        if let Some((offset, limit)) = query.page().window() {
            select.push(" LIMIT ").push_bind(limit);
            select.push(" OFFSET ").push_bind(offset);
        }
        let logs = select
            .build_query_as::<OperationLog>()
            .fetch_all(&self.pool)
            .await?;
        Ok((logs, total))
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM operation_log WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
