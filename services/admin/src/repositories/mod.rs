//! Persistence seams
//!
//! Each table group sits behind an `async_trait` repository with a Postgres
//! implementation and the in-memory [`MemoryStore`] used by tests and local
//! runs.

pub mod admin;
pub mod api;
pub mod memory;
pub mod menu;
pub mod operation_log;
pub mod policy;
pub mod role;

use std::sync::Arc;

use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::PgPool;

use crate::models::{
    Admin, AdminQuery, AdminUpdate, Api, ApiQuery, Menu, NewAdmin, NewApi, NewMenu,
    NewOperationLog, NewRole, OperationLog, OperationLogQuery, Policy, Role, RoleQuery, RoleUpdate,
};

pub use admin::PgAdminRepository;
pub use api::PgApiRepository;
pub use memory::MemoryStore;
pub use menu::PgMenuRepository;
pub use operation_log::PgOperationLogRepository;
pub use policy::PgPolicyAdapter;
pub use role::PgRoleRepository;

/// Admin rows and the admin-role association; every returned admin has its
/// roles hydrated
#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Admin>>;
    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<Admin>>;
    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Admin>>;
    /// Filtered page plus the unpaged total
    async fn list(&self, query: &AdminQuery) -> DatabaseResult<(Vec<Admin>, i64)>;
    async fn count(&self) -> DatabaseResult<i64>;
    async fn create(&self, admin: &NewAdmin) -> DatabaseResult<Admin>;
    /// Replace fields and the whole role set in one transaction
    async fn update(&self, update: &AdminUpdate) -> DatabaseResult<Admin>;
    async fn update_password(&self, username: &str, digest: &str) -> DatabaseResult<()>;
    /// Returns the usernames that were removed
    async fn delete(&self, ids: &[i64]) -> DatabaseResult<Vec<String>>;
}

/// Role rows and the role-menu association
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Role>>;
    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Role>>;
    async fn find_by_keyword(&self, keyword: &str) -> DatabaseResult<Option<Role>>;
    async fn list(&self, query: &RoleQuery) -> DatabaseResult<(Vec<Role>, i64)>;
    async fn create(&self, role: &NewRole) -> DatabaseResult<Role>;
    async fn update(&self, update: &RoleUpdate) -> DatabaseResult<Role>;
    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()>;
    async fn menu_ids(&self, role_id: i64) -> DatabaseResult<Vec<i64>>;
    /// Replace the role's menu set in one transaction
    async fn set_menus(&self, role_id: i64, menu_ids: &[i64]) -> DatabaseResult<()>;
}

#[async_trait]
pub trait MenuRepository: Send + Sync {
    /// All menus ordered by `sort`
    async fn list(&self) -> DatabaseResult<Vec<Menu>>;
    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Menu>>;
    /// Distinct active menus granted to any of the roles
    async fn for_roles(&self, role_ids: &[i64]) -> DatabaseResult<Vec<Menu>>;
    async fn create(&self, menu: &NewMenu) -> DatabaseResult<Menu>;
    async fn update(&self, id: i64, menu: &NewMenu) -> DatabaseResult<Option<Menu>>;
    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()>;
}

#[async_trait]
pub trait ApiRepository: Send + Sync {
    async fn list(&self, query: &ApiQuery) -> DatabaseResult<(Vec<Api>, i64)>;
    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Api>>;
    async fn find_by_ids(&self, ids: &[i64]) -> DatabaseResult<Vec<Api>>;
    /// Exact lookup on canonical `(method, path)`
    async fn find_by_route(&self, method: &str, path: &str) -> DatabaseResult<Option<Api>>;
    async fn create(&self, api: &NewApi) -> DatabaseResult<Api>;
    async fn update(&self, id: i64, api: &NewApi) -> DatabaseResult<Option<Api>>;
    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()>;
}

#[async_trait]
pub trait OperationLogRepository: Send + Sync {
    async fn insert(&self, log: &NewOperationLog) -> DatabaseResult<()>;
    async fn list(&self, query: &OperationLogQuery) -> DatabaseResult<(Vec<OperationLog>, i64)>;
    async fn delete(&self, ids: &[i64]) -> DatabaseResult<()>;
}

/// Persistent side of the policy set
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    async fn load(&self) -> DatabaseResult<Vec<Policy>>;
    /// Insert, ignoring triples that already exist
    async fn add(&self, policies: &[Policy]) -> DatabaseResult<()>;
    async fn remove(&self, policies: &[Policy]) -> DatabaseResult<()>;
}

/// Every repository the gate needs, behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub admins: Arc<dyn AdminRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub menus: Arc<dyn MenuRepository>,
    pub apis: Arc<dyn ApiRepository>,
    pub logs: Arc<dyn OperationLogRepository>,
    pub policies: Arc<dyn PolicyAdapter>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            admins: Arc::new(PgAdminRepository::new(pool.clone())),
            roles: Arc::new(PgRoleRepository::new(pool.clone())),
            menus: Arc::new(PgMenuRepository::new(pool.clone())),
            apis: Arc::new(PgApiRepository::new(pool.clone())),
            logs: Arc::new(PgOperationLogRepository::new(pool.clone())),
            policies: Arc::new(PgPolicyAdapter::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            admins: store.clone(),
            roles: store.clone(),
            menus: store.clone(),
            apis: store.clone(),
            logs: store.clone(),
            policies: store,
        }
    }
}
