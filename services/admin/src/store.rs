//! Admin records, their roles and the identity cache kept in step with them

use std::sync::Arc;

use common::error::DatabaseError;
use tracing::{info, warn};

use crate::error::{GateError, GateResult, LoginFailure};
use crate::identity_cache::IdentityCache;
use crate::models::{Admin, AdminUpdate, NewAdmin};
use crate::password::{verify_dummy, verify_password};
use crate::repositories::AdminRepository;

/// Map a unique violation to a conflict on `what`
pub(crate) fn conflict_on(what: &'static str) -> impl Fn(DatabaseError) -> GateError {
    move |err| {
        if err.is_unique_violation() {
            GateError::Conflict(what)
        } else {
            GateError::Database(err)
        }
    }
}

#[derive(Clone)]
pub struct AdminStore {
    admins: Arc<dyn AdminRepository>,
    cache: IdentityCache,
}

impl AdminStore {
    pub fn new(admins: Arc<dyn AdminRepository>, cache: IdentityCache) -> Self {
        Self { admins, cache }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Check credentials
    ///
    /// The password is verified on every path, against a throwaway digest
    /// when the user is unknown, and every failure collapses into
    /// [`GateError::BadCredentials`]. The specific cause is only logged.
    pub async fn login(&self, username: &str, plaintext: &str) -> GateResult<Admin> {
        let admin = self.admins.find_by_username(username).await?;

        let verified = match &admin {
            Some(admin) => verify_password(&admin.password, plaintext),
            None => {
                verify_dummy(plaintext);
                false
            }
        };

        let failure = match admin {
            None => LoginFailure::UserNotFound,
            Some(admin) if !admin.is_active() => LoginFailure::UserDisabled,
            Some(admin) if admin.active_roles().next().is_none() => LoginFailure::UserRoleDisabled,
            Some(_) if !verified => LoginFailure::PasswordIncorrect,
            Some(admin) => {
                info!("Admin {} logged in", admin.username);
                return Ok(admin);
            }
        };

        warn!("Login refused for {}: {}", username, failure);
        Err(failure.into())
    }

    pub async fn by_id(&self, id: i64) -> GateResult<Admin> {
        self.admins
            .find_by_id(id)
            .await?
            .ok_or(GateError::NotFound("admin"))
    }

    pub async fn by_username(&self, username: &str) -> GateResult<Admin> {
        self.admins
            .find_by_username(username)
            .await?
            .ok_or(GateError::NotFound("admin"))
    }

    pub async fn by_ids(&self, ids: &[i64]) -> GateResult<Vec<Admin>> {
        Ok(self.admins.find_by_ids(ids).await?)
    }

    /// Store a new digest and patch the cached record in place
    pub async fn change_password(&self, username: &str, digest: &str) -> GateResult<()> {
        self.admins.update_password(username, digest).await?;
        self.cache.update_password(username, digest);
        Ok(())
    }

    pub async fn create(&self, admin: &NewAdmin) -> GateResult<Admin> {
        let created = self
            .admins
            .create(admin)
            .await
            .map_err(conflict_on("username"))?;
        self.cache.evict(&created.username);
        Ok(created)
    }

    /// Replace fields and role set; evicts both the old and new username
    pub async fn update(&self, previous_username: &str, update: &AdminUpdate) -> GateResult<Admin> {
        self.cache.evict(previous_username);
        let result = self.admins.update(update).await;
        self.cache.evict(previous_username);
        self.cache.evict(&update.username);
        result.map_err(conflict_on("username"))
    }

    pub async fn delete(&self, ids: &[i64]) -> GateResult<()> {
        let removed = self.admins.delete(ids).await?;
        for username in &removed {
            self.cache.evict(username);
        }
        Ok(())
    }

    pub fn min_rank_of(admin: &Admin) -> i32 {
        admin.min_rank()
    }

    /// One `(id, rank)` per requested id; an unknown id is `NotFound`
    pub async fn min_ranks_of(&self, ids: &[i64]) -> GateResult<Vec<(i64, i32)>> {
        let admins = self.admins.find_by_ids(ids).await?;
        ids.iter()
            .map(|id| {
                admins
                    .iter()
                    .find(|admin| admin.id == *id)
                    .map(|admin| (*id, admin.min_rank()))
                    .ok_or(GateError::NotFound("admin"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRole, Status};
    use crate::password::hash_password;
    use crate::rank::NO_RANK;
    use crate::repositories::{MemoryStore, RoleRepository};

    async fn setup(role_status: Status, admin_status: Status) -> (Arc<MemoryStore>, AdminStore) {
        let memory = Arc::new(MemoryStore::new());
        let role = RoleRepository::create(
            memory.as_ref(),
            &NewRole {
                name: "admin".into(),
                keyword: "admin".into(),
                desc: None,
                status: role_status,
                sort: 1,
                creator: "system".into(),
            },
        )
        .await
        .unwrap();
        AdminRepository::create(
            memory.as_ref(),
            &NewAdmin {
                username: "admin".into(),
                password: hash_password("123456").unwrap(),
                mobile: String::new(),
                avatar: String::new(),
                nickname: None,
                introduction: None,
                status: admin_status,
                creator: "system".into(),
                role_ids: vec![role.id],
            },
        )
        .await
        .unwrap();
        let store = AdminStore::new(memory.clone(), IdentityCache::default());
        (memory, store)
    }

    #[tokio::test]
    async fn login_succeeds_with_active_role() {
        let (_, store) = setup(Status::Active, Status::Active).await;
        let admin = store.login("admin", "123456").await.unwrap();
        assert_eq!(admin.username, "admin");
        assert!(admin.is_super_admin());
    }

    #[tokio::test]
    async fn every_login_failure_is_bad_credentials() {
        let (_, store) = setup(Status::Active, Status::Active).await;
        assert!(matches!(
            store.login("admin", "wrong").await,
            Err(GateError::BadCredentials)
        ));
        assert!(matches!(
            store.login("ghost", "123456").await,
            Err(GateError::BadCredentials)
        ));

        let (_, store) = setup(Status::Disabled, Status::Active).await;
        assert!(matches!(
            store.login("admin", "123456").await,
            Err(GateError::BadCredentials)
        ));

        let (_, store) = setup(Status::Active, Status::Disabled).await;
        assert!(matches!(
            store.login("admin", "123456").await,
            Err(GateError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn change_password_patches_cache() {
        let (_, store) = setup(Status::Active, Status::Active).await;
        let admin = store.by_username("admin").await.unwrap();
        store.cache().put(admin);

        let digest = hash_password("654321").unwrap();
        store.change_password("admin", &digest).await.unwrap();

        assert_eq!(store.cache().get("admin").unwrap().password, digest);
        assert!(store.login("admin", "654321").await.is_ok());
    }

    #[tokio::test]
    async fn update_evicts_old_and_new_names() {
        let (_, store) = setup(Status::Active, Status::Active).await;
        let admin = store.by_username("admin").await.unwrap();
        store.cache().put(admin.clone());

        let update = AdminUpdate {
            id: admin.id,
            username: "root".into(),
            password: None,
            mobile: admin.mobile.clone(),
            avatar: admin.avatar.clone(),
            nickname: Some("Root".into()),
            introduction: None,
            status: Status::Active,
            role_ids: admin.role_ids(),
        };
        let updated = store.update(&admin.username, &update).await.unwrap();
        assert_eq!(updated.nickname.as_deref(), Some("Root"));
        assert!(store.cache().get("admin").is_none());
        assert!(store.cache().get("root").is_none());
    }

    #[tokio::test]
    async fn ranks_and_delete() {
        let (_, store) = setup(Status::Active, Status::Active).await;
        let admin = store.by_username("admin").await.unwrap();
        assert_eq!(store.min_ranks_of(&[admin.id]).await.unwrap(), vec![(admin.id, 1)]);
        assert!(matches!(
            store.min_ranks_of(&[admin.id, 99]).await,
            Err(GateError::NotFound("admin"))
        ));

        store.cache().put(admin.clone());
        store.delete(&[admin.id]).await.unwrap();
        assert!(store.cache().get("admin").is_none());
        assert!(matches!(
            store.by_id(admin.id).await,
            Err(GateError::NotFound(_))
        ));
        assert_eq!(AdminStore::min_rank_of(&Admin { roles: vec![], ..admin }), NO_RANK);
    }
}
