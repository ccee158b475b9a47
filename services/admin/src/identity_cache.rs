//! Username-keyed cache of admin records
//!
//! Every mutation of an admin, of its role set, or of a role it holds must
//! go through one of the eviction calls below before it returns.
//!
//! Each eviction advances an epoch. A read-through fill records the epoch
//! before reading the store and is dropped if any eviction happened since,
//! so a record read before a write can never land after it.

use std::sync::{Arc, Mutex, MutexGuard};

use common::cache::{CacheConfig, LocalCache};
use tracing::debug;

use crate::models::Admin;

/// Position in the eviction history, see [`IdentityCache::epoch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

#[derive(Clone)]
pub struct IdentityCache {
    inner: LocalCache<String, Admin>,
    epoch: Arc<Mutex<u64>>,
}

impl IdentityCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: LocalCache::new(config),
            epoch: Arc::new(Mutex::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run an eviction and advance the epoch under the same lock
    fn evicting(&self, evict: impl FnOnce(&LocalCache<String, Admin>)) {
        let mut epoch = self.lock();
        *epoch += 1;
        evict(&self.inner);
    }

    pub fn get(&self, username: &str) -> Option<Admin> {
        self.inner.get(&username.to_string())
    }

    pub fn put(&self, admin: Admin) {
        let _epoch = self.lock();
        self.inner.put(admin.username.clone(), admin);
    }

    /// Current epoch; take it before reading the store for [`Self::fill`]
    pub fn epoch(&self) -> Epoch {
        Epoch(*self.lock())
    }

    /// Insert a record read from the store at `seen`, unless an eviction
    /// ran since. Returns whether it was cached.
    pub fn fill(&self, seen: Epoch, admin: Admin) -> bool {
        let epoch = self.lock();
        if *epoch != seen.0 {
            debug!("Skipping cache fill for {}, evicted meanwhile", admin.username);
            return false;
        }
        self.inner.put(admin.username.clone(), admin);
        true
    }

    pub fn evict(&self, username: &str) {
        debug!("Evicting cached admin {}", username);
        self.evicting(|inner| inner.evict(&username.to_string()));
    }

    /// Drop every cached admin that holds `role_id`
    pub fn evict_by_role(&self, role_id: i64) {
        debug!("Evicting cached admins holding role {}", role_id);
        self.evicting(|inner| {
            inner.evict_if(move |_, admin| admin.roles.iter().any(|role| role.id == role_id))
        });
    }

    pub fn flush(&self) {
        debug!("Flushing identity cache");
        self.evicting(LocalCache::flush);
    }

    /// Rewrite the cached password hash in place, if the admin is cached
    pub fn update_password(&self, username: &str, digest: &str) {
        let _epoch = self.lock();
        if let Some(mut admin) = self.get(username) {
            admin.password = digest.to_string();
            self.inner.put(admin.username.clone(), admin);
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use crate::models::admin::fixtures::{admin, role};

    #[test]
    fn evict_by_role_is_targeted() {
        let cache = IdentityCache::default();
        cache.put(admin(1, "alice", vec![role(3, "ops", 3, Status::Active)]));
        cache.put(admin(2, "bob", vec![role(4, "audit", 4, Status::Active)]));

        cache.evict_by_role(3);

        assert!(cache.get("alice").is_none());
        assert_eq!(cache.get("bob").map(|a| a.id), Some(2));
    }

    #[test]
    fn password_update_in_place() {
        let cache = IdentityCache::default();
        cache.put(admin(1, "alice", vec![]));
        cache.update_password("alice", "$argon2id$new");
        cache.update_password("nobody", "$argon2id$new");

        assert_eq!(cache.get("alice").unwrap().password, "$argon2id$new");
        assert!(cache.get("nobody").is_none());
    }

    #[test]
    fn fill_is_dropped_after_an_eviction() {
        let cache = IdentityCache::default();
        let seen = cache.epoch();
        cache.evict("alice");
        assert!(!cache.fill(seen, admin(1, "alice", vec![])));
        assert!(cache.get("alice").is_none());

        let seen = cache.epoch();
        assert!(cache.fill(seen, admin(1, "alice", vec![])));
        assert!(cache.get("alice").is_some());
    }

    #[test]
    fn flush_clears() {
        let cache = IdentityCache::default();
        cache.put(admin(1, "alice", vec![]));
        cache.flush();
        assert!(cache.get("alice").is_none());
        assert!(cache.is_empty());
    }
}
