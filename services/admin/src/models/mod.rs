//! Gate data models
//!
//! Rows of the tables the gate reads and writes, plus the payloads used to
//! create and update them.

pub mod admin;
pub mod api;
pub mod menu;
pub mod operation_log;
pub mod policy;
pub mod role;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export for convenience
pub use admin::{Admin, AdminQuery, AdminUpdate, LoginCredentials, NewAdmin};
pub use api::{Api, ApiQuery, ApiTreeNode, NewApi};
pub use menu::{Menu, NewMenu};
pub use operation_log::{NewOperationLog, OperationLog, OperationLogQuery};
pub use policy::Policy;
pub use role::{NewRole, Role, RoleQuery, RoleUpdate};

/// Lifecycle status shared by admins, roles and menus
///
/// Persisted as a small integer: `1` active, `2` disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Status {
    #[default]
    Active,
    Disabled,
}

/// Raised when a stored or submitted status is neither 1 nor 2
#[derive(Debug, Error)]
#[error("invalid status value {0}, expected 1 (active) or 2 (disabled)")]
pub struct InvalidStatus(pub i16);

impl TryFrom<i16> for Status {
    type Error = InvalidStatus;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Status::Active),
            2 => Ok(Status::Disabled),
            other => Err(InvalidStatus(other)),
        }
    }
}

impl From<Status> for i16 {
    fn from(status: Status) -> Self {
        match status {
            Status::Active => 1,
            Status::Disabled => 2,
        }
    }
}

/// One-based paging parameters; zero in either field disables paging
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl Pagination {
    /// `(offset, limit)` when paging is requested
    pub fn window(&self) -> Option<(i64, i64)> {
        if self.page_num > 0 && self.page_size > 0 {
            let offset = (self.page_num as i64 - 1) * self.page_size as i64;
            Some((offset, self.page_size as i64))
        } else {
            None
        }
    }

    /// Apply the window to an in-memory result set
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.window() {
            Some((offset, limit)) => items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            None => items,
        }
    }
}
