//! Audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Pagination;
use super::admin::contains;

/// Persisted audit row; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OperationLog {
    pub id: i64,
    pub username: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    #[sqlx(rename = "description")]
    pub desc: String,
    pub status: i32,
    pub start_time: DateTime<Utc>,
    /// Milliseconds spent in the handler
    pub time_cost: i64,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record as produced by the gate, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperationLog {
    pub username: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub desc: String,
    pub status: i32,
    pub start_time: DateTime<Utc>,
    pub time_cost: i64,
    pub user_agent: String,
}

/// Operation log filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogQuery {
    pub username: Option<String>,
    pub ip: Option<String>,
    pub path: Option<String>,
    pub status: Option<i32>,
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl OperationLogQuery {
    pub fn page(&self) -> Pagination {
        Pagination {
            page_num: self.page_num,
            page_size: self.page_size,
        }
    }

    pub fn matches(&self, log: &OperationLog) -> bool {
        contains(&log.username, self.username.as_deref())
            && contains(&log.ip, self.ip.as_deref())
            && contains(&log.path, self.path.as_deref())
            && self.status.is_none_or(|status| log.status == status)
    }
}
