//! First-run data: the super-admin role, the `admin` account and one API
//! descriptor per core route

use tracing::info;

use crate::error::GateResult;
use crate::models::{NewAdmin, NewApi, NewRole, Status};
use crate::password::hash_password;
use crate::rank::SUPER_ADMIN_RANK;
use crate::repositories::Repositories;

pub const SEED_USERNAME: &str = "admin";
pub const SEED_PASSWORD: &str = "123456";
pub const SEED_ROLE_KEYWORD: &str = "admin";

/// `(method, path, category, description)` of every core route
pub const CORE_APIS: &[(&str, &str, &str, &str)] = &[
    ("POST", "/base/login", "base", "用户登录"),
    ("POST", "/base/logout", "base", "用户登出"),
    ("POST", "/base/refreshToken", "base", "刷新JWT令牌"),
    ("GET", "/admin/info", "admin", "获取当前登录用户信息"),
    ("POST", "/admin/info", "admin", "获取当前登录用户信息"),
    ("GET", "/admin/list", "admin", "获取用户列表"),
    ("PUT", "/admin/changePwd", "admin", "更新用户登录密码"),
    ("POST", "/admin/create", "admin", "创建用户"),
    ("PATCH", "/admin/update/:userID", "admin", "更新用户"),
    ("DELETE", "/admin/delete/batch", "admin", "批量删除用户"),
    ("GET", "/role/list", "role", "获取角色列表"),
    ("POST", "/role/create", "role", "创建角色"),
    ("PATCH", "/role/update/:roleID", "role", "更新角色"),
    ("GET", "/role/menus/get/:roleID", "role", "获取角色的权限菜单"),
    ("PATCH", "/role/menus/update/:roleID", "role", "更新角色的权限菜单"),
    ("GET", "/role/apis/get/:roleID", "role", "获取角色的权限接口"),
    ("PATCH", "/role/apis/update/:roleID", "role", "更新角色的权限接口"),
    ("DELETE", "/role/delete/batch", "role", "批量删除角色"),
    ("GET", "/menu/tree", "menu", "获取菜单树"),
    ("GET", "/menu/list", "menu", "获取菜单列表"),
    ("POST", "/menu/create", "menu", "创建菜单"),
    ("PATCH", "/menu/update/:menuID", "menu", "更新菜单"),
    ("DELETE", "/menu/delete/batch", "menu", "批量删除菜单"),
    ("GET", "/menu/access/list/:userID", "menu", "获取用户的可访问菜单列表"),
    ("GET", "/menu/access/tree/:userID", "menu", "获取用户的可访问菜单树"),
    ("GET", "/api/list", "api", "获取接口列表"),
    ("GET", "/api/tree", "api", "获取接口树"),
    ("POST", "/api/create", "api", "创建接口"),
    ("PATCH", "/api/update/:apiID", "api", "更新接口"),
    ("DELETE", "/api/delete/batch", "api", "批量删除接口"),
    ("GET", "/log/operation/list", "log", "获取操作日志列表"),
    ("DELETE", "/log/operation/delete/batch", "log", "批量删除操作日志"),
];

/// Seed an empty database; returns whether anything was written
pub async fn seed_if_empty(repos: &Repositories) -> GateResult<bool> {
    if repos.admins.count().await? > 0 {
        return Ok(false);
    }

    info!("Admin table is empty, seeding initial data");

    let role = match repos.roles.find_by_keyword(SEED_ROLE_KEYWORD).await? {
        Some(role) => role,
        None => {
            repos
                .roles
                .create(&NewRole {
                    name: "管理员".to_string(),
                    keyword: SEED_ROLE_KEYWORD.to_string(),
                    desc: Some("超级管理员".to_string()),
                    status: Status::Active,
                    sort: SUPER_ADMIN_RANK,
                    creator: "system".to_string(),
                })
                .await?
        }
    };

    repos
        .admins
        .create(&NewAdmin {
            username: SEED_USERNAME.to_string(),
            password: hash_password(SEED_PASSWORD)?,
            mobile: String::new(),
            avatar: String::new(),
            nickname: Some("管理员".to_string()),
            introduction: None,
            status: Status::Active,
            creator: "system".to_string(),
            role_ids: vec![role.id],
        })
        .await?;

    for (method, path, category, desc) in CORE_APIS {
        if repos.apis.find_by_route(method, path).await?.is_none() {
            repos
                .apis
                .create(&NewApi::new(method, path, category, desc))
                .await?;
        }
    }

    info!(
        "Seeded role {}, admin {} and {} API descriptors",
        SEED_ROLE_KEYWORD,
        SEED_USERNAME,
        CORE_APIS.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApiQuery;
    use crate::repositories::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn seeds_once() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));

        assert!(seed_if_empty(&repos).await.unwrap());
        assert!(!seed_if_empty(&repos).await.unwrap());

        let admin = repos
            .admins
            .find_by_username(SEED_USERNAME)
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_super_admin());

        let (apis, total) = repos.apis.list(&ApiQuery::default()).await.unwrap();
        assert_eq!(total as usize, CORE_APIS.len());
        assert!(apis.iter().any(|api| api.path == "/admin/list" && api.method == "GET"));
    }
}
