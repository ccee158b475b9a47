//! Per-request authorization decision

use std::sync::Arc;

use tracing::debug;

use super::PolicyStore;
use crate::models::Admin;

/// Exact-match `(subjects, object, action)` evaluation with the super-admin
/// bypass
#[derive(Clone)]
pub struct Enforcer {
    store: Arc<PolicyStore>,
}

impl Enforcer {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// True iff one of `subjects` holds `(object, action)`
    pub async fn check(&self, subjects: &[String], object: &str, action: &str) -> bool {
        self.store.allows(subjects, object, action).await
    }

    /// Keywords of the admin's active roles
    pub fn subjects(admin: &Admin) -> Vec<String> {
        admin.subjects()
    }

    /// Decision for a hydrated admin; super-admins are always allowed
    pub async fn check_admin(&self, admin: &Admin, object: &str, action: &str) -> bool {
        if admin.is_super_admin() {
            debug!("Super-admin {} bypasses policy check", admin.username);
            return true;
        }
        self.check(&Self::subjects(admin), object, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::admin::fixtures::{admin, role};
    use crate::models::{Policy, Status};
    use crate::repositories::MemoryStore;

    async fn enforcer(policies: Vec<Policy>) -> Enforcer {
        let store = PolicyStore::new(Arc::new(MemoryStore::new()));
        store.add(policies).await.unwrap();
        Enforcer::new(Arc::new(store))
    }

    #[tokio::test]
    async fn editor_gets_only_what_is_granted() {
        let enforcer = enforcer(vec![Policy::new("editor", "/post", "GET")]).await;
        let editor = admin(2, "editor", vec![role(5, "editor", 5, Status::Active)]);

        assert!(enforcer.check_admin(&editor, "/post", "GET").await);
        assert!(!enforcer.check_admin(&editor, "/post", "DELETE").await);
        assert!(!enforcer.check_admin(&editor, "/posts", "GET").await);
    }

    #[tokio::test]
    async fn disabled_roles_grant_nothing() {
        let enforcer = enforcer(vec![Policy::new("editor", "/post", "GET")]).await;
        let editor = admin(2, "editor", vec![role(5, "editor", 5, Status::Disabled)]);
        assert!(!enforcer.check_admin(&editor, "/post", "GET").await);
    }

    #[tokio::test]
    async fn super_admin_bypasses_empty_policy_set() {
        let enforcer = enforcer(vec![]).await;
        let root = admin(1, "admin", vec![role(1, "admin", 1, Status::Active)]);
        for (object, action) in [("/admin/list", "GET"), ("/anything", "DELETE"), ("", "PATCH")] {
            assert!(enforcer.check_admin(&root, object, action).await);
        }

        let demoted = admin(1, "admin", vec![role(1, "admin", 1, Status::Disabled)]);
        assert!(!enforcer.check_admin(&demoted, "/admin/list", "GET").await);
    }
}
