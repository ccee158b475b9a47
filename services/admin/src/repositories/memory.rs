//! In-memory implementation of every repository
//!
//! Mirrors the Postgres schema closely enough for tests and local runs:
//! unique keys raise `UniqueViolation`, association rows cascade on delete,
//! and multi-row writes happen under one write lock.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use common::error::{DatabaseError, DatabaseResult};
use tokio::sync::RwLock;

use super::{
    AdminRepository, ApiRepository, MenuRepository, OperationLogRepository, PolicyAdapter,
    RoleRepository,
};
use crate::models::{
    Admin, AdminQuery, AdminUpdate, Api, ApiQuery, Menu, NewAdmin, NewApi, NewMenu,
    NewOperationLog, NewRole, OperationLog, OperationLogQuery, Policy, Role, RoleQuery, RoleUpdate,
    Status,
};

#[derive(Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Default)]
struct Tables {
    admin_seq: Sequence,
    role_seq: Sequence,
    menu_seq: Sequence,
    api_seq: Sequence,
    log_seq: Sequence,
    admins: BTreeMap<i64, Admin>,
    admin_roles: BTreeSet<(i64, i64)>,
    roles: BTreeMap<i64, Role>,
    role_menus: BTreeSet<(i64, i64)>,
    menus: BTreeMap<i64, Menu>,
    apis: BTreeMap<i64, Api>,
    logs: BTreeMap<i64, OperationLog>,
    policies: Vec<Policy>,
}

impl Tables {
    fn hydrate(&self, admin: &Admin) -> Admin {
        let mut roles: Vec<Role> = self
            .admin_roles
            .iter()
            .filter(|(admin_id, _)| *admin_id == admin.id)
            .filter_map(|(_, role_id)| self.roles.get(role_id).cloned())
            .collect();
        roles.sort_by_key(|role| (role.sort, role.id));
        Admin {
            roles,
            ..admin.clone()
        }
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.admins
            .values()
            .any(|a| a.username == username && Some(a.id) != except)
    }

    fn replace_admin_roles(&mut self, admin_id: i64, role_ids: &[i64]) {
        self.admin_roles.retain(|(id, _)| *id != admin_id);
        for role_id in role_ids {
            if self.roles.contains_key(role_id) {
                self.admin_roles.insert((admin_id, *role_id));
            }
        }
    }

    fn role_conflict(&self, name: &str, keyword: &str, except: Option<i64>) -> Option<&'static str> {
        self.roles
            .values()
            .filter(|r| Some(r.id) != except)
            .find_map(|r| {
                if r.keyword == keyword {
                    Some("role_keyword_key")
                } else if r.name == name {
                    Some("role_name_key")
                } else {
                    None
                }
            })
    }

    fn api_conflict(&self, method: &str, path: &str, except: Option<i64>) -> bool {
        self.apis.values().any(|a| {
            Some(a.id) != except
                && a.method.eq_ignore_ascii_case(method)
                && a.path.eq_ignore_ascii_case(path)
        })
    }
}

/// Process-local store used by tests and local development
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique(constraint: &str) -> DatabaseError {
    DatabaseError::UniqueViolation(constraint.to_string())
}

fn missing() -> DatabaseError {
    DatabaseError::Query(sqlx::Error::RowNotFound)
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Admin>> {
        let tables = self.tables.read().await;
        Ok(tables.admins.get(&id).map(|a| tables.hydrate(a)))
    }

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<Admin>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .find(|a| a.username == username)
            .map(|a| tables.hydrate(a)))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Admin>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .filter(|a| ids.contains(&a.id))
            .map(|a| tables.hydrate(a))
            .collect())
    }

    async fn list(&self, query: &AdminQuery) -> DatabaseResult<(Vec<Admin>, i64)> {
        let tables = self.tables.read().await;
        let matched: Vec<Admin> = tables
            .admins
            .values()
            .filter(|a| query.matches(a))
            .map(|a| tables.hydrate(a))
            .collect();
        let total = matched.len() as i64;
        Ok((query.page().slice(matched), total))
    }

    async fn count(&self) -> DatabaseResult<i64> {
        Ok(self.tables.read().await.admins.len() as i64)
    }

    async fn create(&self, new_admin: &NewAdmin) -> DatabaseResult<Admin> {
        let mut tables = self.tables.write().await;
        if tables.username_taken(&new_admin.username, None) {
            return Err(unique("admin_username_key"));
        }
        let id = tables.admin_seq.next();
        let now = Utc::now();
        let admin = Admin {
            id,
            username: new_admin.username.clone(),
            password: new_admin.password.clone(),
            mobile: new_admin.mobile.clone(),
            avatar: new_admin.avatar.clone(),
            nickname: new_admin.nickname.clone(),
            introduction: new_admin.introduction.clone(),
            status: new_admin.status,
            creator: new_admin.creator.clone(),
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.admins.insert(id, admin.clone());
        tables.replace_admin_roles(id, &new_admin.role_ids);
        Ok(tables.hydrate(&admin))
    }

    async fn update(&self, update: &AdminUpdate) -> DatabaseResult<Admin> {
        let mut tables = self.tables.write().await;
        if tables.username_taken(&update.username, Some(update.id)) {
            return Err(unique("admin_username_key"));
        }
        let admin = tables.admins.get_mut(&update.id).ok_or_else(missing)?;
        admin.username = update.username.clone();
        if let Some(password) = &update.password {
            admin.password = password.clone();
        }
        admin.mobile = update.mobile.clone();
        admin.avatar = update.avatar.clone();
        admin.nickname = update.nickname.clone();
        admin.introduction = update.introduction.clone();
        admin.status = update.status;
        admin.updated_at = Utc::now();
        let admin = admin.clone();

        tables.replace_admin_roles(update.id, &update.role_ids);
        Ok(tables.hydrate(&admin))
    }

    async fn update_password(&self, username: &str, digest: &str) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(admin) = tables.admins.values_mut().find(|a| a.username == username) {
            admin.password = digest.to_string();
            admin.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<Vec<String>> {
        let mut tables = self.tables.write().await;
        let mut removed = Vec::new();
        for id in ids {
            if let Some(admin) = tables.admins.remove(id) {
                removed.push(admin.username);
            }
        }
        tables.admin_roles.retain(|(admin_id, _)| !ids.contains(admin_id));
        Ok(removed)
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let mut roles: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();
        roles.sort_by_key(|role| (role.sort, role.id));
        Ok(roles)
    }

    async fn find_by_keyword(&self, keyword: &str) -> DatabaseResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().find(|r| r.keyword == keyword).cloned())
    }

    async fn list(&self, query: &RoleQuery) -> DatabaseResult<(Vec<Role>, i64)> {
        let tables = self.tables.read().await;
        let mut matched: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|role| (role.sort, role.id));
        let total = matched.len() as i64;
        Ok((query.page().slice(matched), total))
    }

    async fn create(&self, new_role: &NewRole) -> DatabaseResult<Role> {
        let mut tables = self.tables.write().await;
        if let Some(constraint) = tables.role_conflict(&new_role.name, &new_role.keyword, None) {
            return Err(unique(constraint));
        }
        let id = tables.role_seq.next();
        let now = Utc::now();
        let role = Role {
            id,
            name: new_role.name.clone(),
            keyword: new_role.keyword.clone(),
            desc: new_role.desc.clone(),
            status: new_role.status,
            sort: new_role.sort,
            creator: new_role.creator.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn update(&self, update: &RoleUpdate) -> DatabaseResult<Role> {
        let mut tables = self.tables.write().await;
        if let Some(constraint) = tables.role_conflict(&update.name, &update.keyword, Some(update.id))
        {
            return Err(unique(constraint));
        }
        let role = tables.roles.get_mut(&update.id).ok_or_else(missing)?;
        role.name = update.name.clone();
        role.keyword = update.keyword.clone();
        role.desc = update.desc.clone();
        role.status = update.status;
        role.sort = update.sort;
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.roles.retain(|id, _| !ids.contains(id));
        tables.admin_roles.retain(|(_, role_id)| !ids.contains(role_id));
        tables.role_menus.retain(|(role_id, _)| !ids.contains(role_id));
        Ok(())
    }

    async fn menu_ids(&self, role_id: i64) -> DatabaseResult<Vec<i64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_menus
            .iter()
            .filter(|(id, _)| *id == role_id)
            .map(|(_, menu_id)| *menu_id)
            .collect())
    }

    async fn set_menus(&self, role_id: i64, menu_ids: &[i64]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.role_menus.retain(|(id, _)| *id != role_id);
        for menu_id in menu_ids {
            if tables.menus.contains_key(menu_id) {
                tables.role_menus.insert((role_id, *menu_id));
            }
        }
        Ok(())
    }
}

fn menu_from(id: i64, menu: &NewMenu, created_at: chrono::DateTime<Utc>) -> Menu {
    Menu {
        id,
        name: menu.name.clone(),
        title: menu.title.clone(),
        icon: menu.icon.clone(),
        path: menu.path.clone(),
        redirect: menu.redirect.clone(),
        component: menu.component.clone(),
        sort: menu.sort,
        status: menu.status,
        hidden: menu.hidden,
        parent_id: menu.parent_id,
        creator: menu.creator.clone(),
        created_at,
        updated_at: Utc::now(),
        children: Vec::new(),
    }
}

fn sorted_menus<'a>(menus: impl Iterator<Item = &'a Menu>) -> Vec<Menu> {
    let mut menus: Vec<Menu> = menus.cloned().collect();
    menus.sort_by_key(|menu| (menu.sort, menu.id));
    menus
}

#[async_trait]
impl MenuRepository for MemoryStore {
    async fn list(&self) -> DatabaseResult<Vec<Menu>> {
        Ok(sorted_menus(self.tables.read().await.menus.values()))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Menu>> {
        let tables = self.tables.read().await;
        Ok(sorted_menus(
            tables.menus.values().filter(|m| ids.contains(&m.id)),
        ))
    }

    async fn for_roles(&self, role_ids: &[i64]) -> DatabaseResult<Vec<Menu>> {
        let tables = self.tables.read().await;
        let granted: BTreeSet<i64> = tables
            .role_menus
            .iter()
            .filter(|(role_id, _)| role_ids.contains(role_id))
            .map(|(_, menu_id)| *menu_id)
            .collect();
        Ok(sorted_menus(tables.menus.values().filter(|m| {
            granted.contains(&m.id) && m.status == Status::Active
        })))
    }

    async fn create(&self, menu: &NewMenu) -> DatabaseResult<Menu> {
        let mut tables = self.tables.write().await;
        let id = tables.menu_seq.next();
        let menu = menu_from(id, menu, Utc::now());
        tables.menus.insert(id, menu.clone());
        Ok(menu)
    }

    async fn update(&self, id: i64, menu: &NewMenu) -> DatabaseResult<Option<Menu>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.menus.get(&id) else {
            return Ok(None);
        };
        let updated = Menu {
            creator: existing.creator.clone(),
            ..menu_from(id, menu, existing.created_at)
        };
        tables.menus.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.menus.retain(|id, _| !ids.contains(id));
        tables.role_menus.retain(|(_, menu_id)| !ids.contains(menu_id));
        Ok(())
    }
}

#[async_trait]
impl ApiRepository for MemoryStore {
    async fn list(&self, query: &ApiQuery) -> DatabaseResult<(Vec<Api>, i64)> {
        let tables = self.tables.read().await;
        let mut matched: Vec<Api> = tables
            .apis
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
        let total = matched.len() as i64;
        Ok((query.page().slice(matched), total))
    }

    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Api>> {
        Ok(self.tables.read().await.apis.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Api>> {
        let tables = self.tables.read().await;
        Ok(tables
            .apis
            .values()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn find_by_route(&self, method: &str, path: &str) -> DatabaseResult<Option<Api>> {
        let tables = self.tables.read().await;
        Ok(tables
            .apis
            .values()
            .find(|a| a.method.eq_ignore_ascii_case(method) && a.path.eq_ignore_ascii_case(path))
            .cloned())
    }

    async fn create(&self, api: &NewApi) -> DatabaseResult<Api> {
        let mut tables = self.tables.write().await;
        if tables.api_conflict(&api.method, &api.path, None) {
            return Err(unique("api_method_path_key"));
        }
        let id = tables.api_seq.next();
        let now = Utc::now();
        let api = Api {
            id,
            method: api.method.clone(),
            path: api.path.clone(),
            category: api.category.clone(),
            desc: api.desc.clone(),
            creator: api.creator.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.apis.insert(id, api.clone());
        Ok(api)
    }

    async fn update(&self, id: i64, api: &NewApi) -> DatabaseResult<Option<Api>> {
        let mut tables = self.tables.write().await;
        if tables.api_conflict(&api.method, &api.path, Some(id)) {
            return Err(unique("api_method_path_key"));
        }
        let Some(existing) = tables.apis.get_mut(&id) else {
            return Ok(None);
        };
        existing.method = api.method.clone();
        existing.path = api.path.clone();
        existing.category = api.category.clone();
        existing.desc = api.desc.clone();
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.apis.retain(|id, _| !ids.contains(id));
        Ok(())
    }
}

#[async_trait]
impl OperationLogRepository for MemoryStore {
    async fn insert(&self, log: &NewOperationLog) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        let id = tables.log_seq.next();
        tables.logs.insert(
            id,
            OperationLog {
                id,
                username: log.username.clone(),
                ip: log.ip.clone(),
                method: log.method.clone(),
                path: log.path.clone(),
                desc: log.desc.clone(),
                status: log.status,
                start_time: log.start_time,
                time_cost: log.time_cost,
                user_agent: log.user_agent.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, query: &OperationLogQuery) -> DatabaseResult<(Vec<OperationLog>, i64)> {
        let tables = self.tables.read().await;
        let matched: Vec<OperationLog> = tables
            .logs
            .values()
            .rev()
            .filter(|log| query.matches(log))
            .cloned()
            .collect();
        let total = matched.len() as i64;
        Ok((query.page().slice(matched), total))
    }

    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.logs.retain(|id, _| !ids.contains(id));
        Ok(())
    }
}

#[async_trait]
impl PolicyAdapter for MemoryStore {
    async fn load(&self) -> DatabaseResult<Vec<Policy>> {
        Ok(self.tables.read().await.policies.clone())
    }

    async fn add(&self, policies: &[Policy]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        for policy in policies {
            if !tables.policies.contains(policy) {
                tables.policies.push(policy.clone());
            }
        }
        Ok(())
    }

    async fn remove(&self, policies: &[Policy]) -> DatabaseResult<()> {
        let mut tables = self.tables.write().await;
        tables.policies.retain(|p| !policies.contains(p));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_role(keyword: &str, sort: i32) -> NewRole {
        NewRole {
            name: keyword.to_string(),
            keyword: keyword.to_string(),
            desc: None,
            status: Status::Active,
            sort,
            creator: "system".to_string(),
        }
    }

    fn new_admin(username: &str, role_ids: Vec<i64>) -> NewAdmin {
        NewAdmin {
            username: username.to_string(),
            password: "hash".to_string(),
            mobile: String::new(),
            avatar: String::new(),
            nickname: None,
            introduction: None,
            status: Status::Active,
            creator: "system".to_string(),
            role_ids,
        }
    }

    #[tokio::test]
    async fn admin_roles_are_hydrated_and_cascade() {
        let store = MemoryStore::new();
        let ops = RoleRepository::create(&store, &new_role("ops", 3)).await.unwrap();
        let root = RoleRepository::create(&store, &new_role("admin", 1)).await.unwrap();
        let admin = AdminRepository::create(&store, &new_admin("alice", vec![ops.id, root.id]))
            .await
            .unwrap();

        let keywords: Vec<_> = admin.roles.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["admin", "ops"]);

        RoleRepository::delete(&store, &[root.id]).await.unwrap();
        let admin = AdminRepository::find_by_username(&store, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role_ids(), vec![ops.id]);
    }

    #[tokio::test]
    async fn duplicate_username_is_unique_violation() {
        let store = MemoryStore::new();
        AdminRepository::create(&store, &new_admin("alice", vec![]))
            .await
            .unwrap();
        let err = AdminRepository::create(&store, &new_admin("alice", vec![]))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn admin_list_pages_and_counts() {
        let store = MemoryStore::new();
        for name in ["alice", "bob", "carol"] {
            AdminRepository::create(&store, &new_admin(name, vec![]))
                .await
                .unwrap();
        }
        let query = AdminQuery {
            page_num: 2,
            page_size: 2,
            ..Default::default()
        };
        let (page, total) = AdminRepository::list(&store, &query).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].username, "carol");
    }

    #[tokio::test]
    async fn policies_are_a_set() {
        let store = MemoryStore::new();
        let p = Policy::new("ops", "/project", "GET");
        store.add(&[p.clone(), p.clone()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec![p.clone()]);
        store.remove(&[p]).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }
}
