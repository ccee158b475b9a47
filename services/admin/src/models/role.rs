//! Role model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::admin::contains;
use super::{Pagination, Status};
use crate::rank::SUPER_ADMIN_RANK;

/// Role entity; `keyword` is the policy subject and `sort` the rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub keyword: String,
    #[sqlx(rename = "description")]
    pub desc: Option<String>,
    #[sqlx(try_from = "i16")]
    pub status: Status,
    pub sort: i32,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Active and holding the reserved top rank
    pub fn is_super(&self) -> bool {
        self.is_active() && self.sort == SUPER_ADMIN_RANK
    }
}

/// New role creation payload
#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub keyword: String,
    pub desc: Option<String>,
    pub status: Status,
    pub sort: i32,
    pub creator: String,
}

/// Role update payload
#[derive(Debug, Clone)]
pub struct RoleUpdate {
    pub id: i64,
    pub name: String,
    pub keyword: String,
    pub desc: Option<String>,
    pub status: Status,
    pub sort: i32,
}

/// Role list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    pub name: Option<String>,
    pub keyword: Option<String>,
    pub status: Option<i16>,
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl RoleQuery {
    pub fn page(&self) -> Pagination {
        Pagination {
            page_num: self.page_num,
            page_size: self.page_size,
        }
    }

    pub fn matches(&self, role: &Role) -> bool {
        contains(&role.name, self.name.as_deref())
            && contains(&role.keyword, self.keyword.as_deref())
            && self
                .status
                .is_none_or(|status| i16::from(role.status) == status)
    }
}
