//! Login and request-scope identity resolution

use tracing::debug;

use crate::error::{GateError, GateResult, TokenError};
use crate::jwt::{Claims, IssuedToken, TokenIssuer};
use crate::models::{Admin, LoginCredentials};
use crate::store::AdminStore;

#[derive(Clone)]
pub struct AuthService {
    store: AdminStore,
    issuer: TokenIssuer,
}

impl AuthService {
    pub fn new(store: AdminStore, issuer: TokenIssuer) -> Self {
        Self { store, issuer }
    }

    pub fn store(&self) -> &AdminStore {
        &self.store
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Verify credentials and mint a token embedding the admin snapshot
    pub async fn login(&self, credentials: &LoginCredentials) -> GateResult<IssuedToken> {
        let admin = self
            .store
            .login(&credentials.username, &credentials.password)
            .await?;
        Ok(self.issuer.issue(&admin)?)
    }

    pub fn refresh(&self, token: &str) -> GateResult<IssuedToken> {
        Ok(self.issuer.refresh(token)?)
    }

    /// Authoritative admin behind validated claims
    ///
    /// The snapshot in the claims only supplies the cache key. A miss, or a
    /// cached record under that name with a different id, falls back to the
    /// store and repopulates the cache unless an eviction ran during the
    /// read.
    pub async fn current(&self, claims: &Claims) -> GateResult<Admin> {
        let hint = claims.admin()?;
        let cache = self.store.cache();

        if let Some(admin) = cache.get(&hint.username) {
            if admin.id == claims.identity {
                return Ok(admin);
            }
        }

        debug!("Identity cache miss for {}", hint.username);
        let seen = cache.epoch();
        let admin = match self.store.by_id(claims.identity).await {
            Ok(admin) => admin,
            Err(GateError::NotFound(_)) => return Err(TokenError::UnknownIdentity.into()),
            Err(err) => return Err(err),
        };
        cache.fill(seen, admin.clone());
        Ok(admin)
    }

    /// The current admin together with its minimum active rank
    pub async fn current_min_rank(&self, claims: &Claims) -> GateResult<(i32, Admin)> {
        let admin = self.current(claims).await?;
        Ok((AdminStore::min_rank_of(&admin), admin))
    }
}
