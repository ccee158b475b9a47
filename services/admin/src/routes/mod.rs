//! Admin API routes
//!
//! Every route lives under the configured URL prefix. `/base/*` is public;
//! everything else passes authentication and authorization first. The
//! whole prefixed group is rate limited, localized and audited.

pub mod admin;
pub mod api;
pub mod base;
pub mod menu;
pub mod operation_log;
pub mod role;

use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::{
    AppState,
    error::{GateError, GateResult},
    middleware::{audit, authenticate, authorize, negotiate_lang, rate_limit},
    models::Role,
};

/// Body of every `delete/batch` route
#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// Create the router for the admin gate
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, Router::new())
}

/// Same as [`create_router`], with extra routes placed behind the gate
/// alongside the admin routes
pub fn create_router_with(state: AppState, extra: Router<AppState>) -> Router {
    let protected = Router::new()
        .merge(admin::routes())
        .merge(role::routes())
        .merge(menu::routes())
        .merge(api::routes())
        .merge(operation_log::routes())
        .merge(extra)
        .route_layer(from_fn_with_state(state.clone(), authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let gated = Router::new()
        .merge(base::routes())
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), audit))
        .layer(from_fn(negotiate_lang))
        .layer(from_fn_with_state(state.clone(), rate_limit));

    let prefix = state.config.system.path_prefix();
    let router = if prefix.is_empty() {
        gated
    } else {
        Router::new().nest(&prefix, gated)
    };

    router
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db_pool {
        None => "memory",
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => "ok",
            Ok(false) => "down",
            Err(e) => {
                error!("Database health check failed: {}", e);
                "down"
            }
        },
    };

    Json(json!({
        "status": "ok",
        "service": "admin-gate",
        "database": database,
    }))
}

/// Load roles by id, failing when any of them does not exist
pub(crate) async fn resolve_roles(state: &AppState, ids: &[i64]) -> GateResult<Vec<Role>> {
    let wanted: HashSet<i64> = ids.iter().copied().collect();
    let roles = state.repos.roles.find_by_ids(ids).await?;
    if roles.len() != wanted.len() {
        return Err(GateError::NotFound("role"));
    }
    Ok(roles)
}
