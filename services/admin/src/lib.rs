//! Identity, authorization and request gating for admin APIs
//!
//! The crate is organized leaves first: password hashing, tokens, the
//! policy store and the identity cache sit at the bottom; the admin store
//! and enforcer build on them; [`auth_service`] ties login and per-request
//! identity together; [`middleware`] composes the gate that [`routes`]
//! wraps around every admin route.

pub mod audit;
pub mod auth_service;
pub mod config;
pub mod error;
pub mod extract;
pub mod i18n;
pub mod identity_cache;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod rank;
pub mod rate_limiter;
pub mod repositories;
pub mod response;
pub mod routes;
pub mod seed;
pub mod store;
pub mod validation;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::audit::{AuditSink, AuditWorkers};
use crate::auth_service::AuthService;
use crate::config::AppConfig;
use crate::identity_cache::IdentityCache;
use crate::jwt::TokenIssuer;
use crate::policy::{Enforcer, PolicyStore};
use crate::rate_limiter::RateLimiter;
use crate::repositories::Repositories;
use crate::store::AdminStore;

/// Application state shared across handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repos: Repositories,
    pub auth: AuthService,
    pub enforcer: Enforcer,
    pub rate_limiter: RateLimiter,
    pub audit: AuditSink,
    /// `None` when running on the in-memory store
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire every component and load the policy set
    ///
    /// Must run inside a Tokio runtime: the audit workers are spawned here.
    pub async fn build(
        config: AppConfig,
        repos: Repositories,
        db_pool: Option<PgPool>,
    ) -> Result<(AppState, AuditWorkers)> {
        let cache = IdentityCache::new(&config.cache.to_cache_config());
        let store = AdminStore::new(repos.admins.clone(), cache);
        let issuer = TokenIssuer::new(&config.jwt);
        let auth = AuthService::new(store, issuer);

        let policies = Arc::new(PolicyStore::new(repos.policies.clone()));
        policies.load().await.context("Failed to load policies")?;
        let enforcer = Enforcer::new(policies);

        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        let (audit, workers) = AuditSink::start(&config.audit, repos.logs.clone(), repos.apis.clone());

        let state = AppState {
            config: Arc::new(config),
            repos,
            auth,
            enforcer,
            rate_limiter,
            audit,
            db_pool,
        };
        Ok((state, workers))
    }

    pub fn cache(&self) -> &IdentityCache {
        self.auth.store().cache()
    }

    pub fn admins(&self) -> &AdminStore {
        self.auth.store()
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        self.enforcer.store()
    }
}
