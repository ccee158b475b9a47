//! Admin model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Pagination, Role, Status};
use crate::rank::NO_RANK;

/// Admin entity
///
/// The same shape is embedded in tokens and cached per username. The
/// password hash never leaves the process: it is skipped on serialization
/// and defaults to empty when a snapshot is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub mobile: String,
    pub avatar: String,
    pub nickname: Option<String>,
    pub introduction: Option<String>,
    #[sqlx(try_from = "i16")]
    pub status: Status,
    pub creator: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Roles that currently grant anything
    pub fn active_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|role| role.is_active())
    }

    /// Policy subjects: keywords of the active roles
    pub fn subjects(&self) -> Vec<String> {
        self.active_roles().map(|role| role.keyword.clone()).collect()
    }

    /// Minimum `sort` over active roles, [`NO_RANK`] when there is none
    pub fn min_rank(&self) -> i32 {
        self.active_roles()
            .map(|role| role.sort)
            .min()
            .unwrap_or(NO_RANK)
    }

    pub fn is_super_admin(&self) -> bool {
        self.active_roles().any(Role::is_super)
    }

    pub fn role_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.roles.iter().map(|role| role.id).collect();
        ids.sort_unstable();
        ids
    }

    /// JSON snapshot carried in the token `user` claim
    pub fn snapshot(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_snapshot(snapshot: &str) -> serde_json::Result<Self> {
        serde_json::from_str(snapshot)
    }
}

/// Login payload
#[derive(Debug, Clone, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

/// New admin creation payload; `password` is already hashed
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub mobile: String,
    pub avatar: String,
    pub nickname: Option<String>,
    pub introduction: Option<String>,
    pub status: Status,
    pub creator: String,
    pub role_ids: Vec<i64>,
}

/// Full replacement of an admin's mutable fields
///
/// `password` is `None` to keep the stored hash.
#[derive(Debug, Clone)]
pub struct AdminUpdate {
    pub id: i64,
    pub username: String,
    pub password: Option<String>,
    pub mobile: String,
    pub avatar: String,
    pub nickname: Option<String>,
    pub introduction: Option<String>,
    pub status: Status,
    pub role_ids: Vec<i64>,
}

/// Admin list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuery {
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub mobile: Option<String>,
    pub status: Option<i16>,
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl AdminQuery {
    pub fn page(&self) -> Pagination {
        Pagination {
            page_num: self.page_num,
            page_size: self.page_size,
        }
    }

    pub fn matches(&self, admin: &Admin) -> bool {
        contains(&admin.username, self.username.as_deref())
            && contains(
                admin.nickname.as_deref().unwrap_or_default(),
                self.nickname.as_deref(),
            )
            && contains(&admin.mobile, self.mobile.as_deref())
            && self
                .status
                .is_none_or(|status| i16::from(admin.status) == status)
    }
}

pub(crate) fn contains(value: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) if !needle.is_empty() => value.contains(needle),
        _ => true,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn role(id: i64, keyword: &str, sort: i32, status: Status) -> Role {
        let now = Utc::now();
        Role {
            id,
            name: keyword.to_string(),
            keyword: keyword.to_string(),
            desc: None,
            status,
            sort,
            creator: "system".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn admin(id: i64, username: &str, roles: Vec<Role>) -> Admin {
        let now = Utc::now();
        Admin {
            id,
            username: username.to_string(),
            password: "$argon2id$hash".to_string(),
            mobile: "13800000000".to_string(),
            avatar: String::new(),
            nickname: Some(username.to_string()),
            introduction: None,
            status: Status::Active,
            creator: "system".to_string(),
            roles,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{admin, role};
    use super::*;

    #[test]
    fn snapshot_drops_password() {
        let original = admin(1, "admin", vec![role(1, "admin", 1, Status::Active)]);
        let snapshot = original.snapshot().unwrap();
        assert!(!snapshot.contains("argon2"));

        let decoded = Admin::from_snapshot(&snapshot).unwrap();
        assert_eq!(decoded.password, "");
        assert_eq!(
            decoded,
            Admin {
                password: String::new(),
                ..original
            }
        );
    }

    #[test]
    fn rank_ignores_disabled_roles() {
        let a = admin(
            2,
            "ops",
            vec![
                role(1, "admin", 1, Status::Disabled),
                role(2, "ops", 4, Status::Active),
                role(3, "audit", 7, Status::Active),
            ],
        );
        assert_eq!(a.min_rank(), 4);
        assert!(!a.is_super_admin());
        assert_eq!(a.subjects(), vec!["ops", "audit"]);

        let nobody = admin(3, "nobody", vec![]);
        assert_eq!(nobody.min_rank(), NO_RANK);
    }

    #[test]
    fn query_filters_by_substring_and_status() {
        let a = admin(1, "alice", vec![]);
        let query = AdminQuery {
            username: Some("lic".into()),
            status: Some(1),
            ..Default::default()
        };
        assert!(query.matches(&a));

        let query = AdminQuery {
            status: Some(2),
            ..Default::default()
        };
        assert!(!query.matches(&a));
    }
}
