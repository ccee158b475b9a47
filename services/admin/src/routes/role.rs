//! Role management, menu grants and API grants

use std::collections::HashSet;

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::IdsRequest;
use crate::{
    AppState,
    error::{GateError, GateResult},
    extract::Payload,
    middleware::CurrentAdmin,
    models::{
        Api, ApiQuery, Menu, NewRole, Policy, Role, RoleQuery, RoleUpdate, Status,
        policy::{canonical_action, canonical_object},
    },
    rank::{self, RankViolation},
    response::{Envelope, PageData},
    store::conflict_on,
    validation::{validate_ids, validate_keyword, validate_name, validate_rank, validate_status},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/role/list", get(list))
        .route("/role/create", post(create))
        .route("/role/update/:roleID", patch(update))
        .route("/role/menus/get/:roleID", get(menus))
        .route("/role/menus/update/:roleID", patch(update_menus))
        .route("/role/apis/get/:roleID", get(apis))
        .route("/role/apis/update/:roleID", patch(update_apis))
        .route("/role/delete/batch", delete(delete_batch))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    pub keyword: String,
    pub desc: Option<String>,
    #[serde(default)]
    pub status: Status,
    pub sort: i32,
}

impl RoleRequest {
    fn validate(&self) -> GateResult<()> {
        validate_name("name", &self.name)?;
        validate_keyword(&self.keyword)?;
        validate_status(self.status.into())?;
        validate_rank(self.sort)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuGrantRequest {
    #[serde(default)]
    pub menu_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGrantRequest {
    #[serde(default)]
    pub api_ids: Vec<i64>,
}

async fn role_by_id(state: &AppState, id: i64) -> GateResult<Role> {
    state
        .repos
        .roles
        .find_by_id(id)
        .await?
        .ok_or(GateError::NotFound("role"))
}

fn route_key(api: &Api) -> (String, String) {
    (canonical_object(&api.path), canonical_action(&api.method))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> GateResult<Envelope<PageData<Role>>> {
    let page = state.repos.roles.list(&query).await?;
    Ok(Envelope::success(PageData::new(page)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(payload): Payload<RoleRequest>,
) -> GateResult<Envelope<Role>> {
    payload.validate()?;
    rank::check_create_role(&operator, payload.sort)?;

    let role = NewRole {
        name: payload.name,
        keyword: payload.keyword,
        desc: payload.desc,
        status: payload.status,
        sort: payload.sort,
        creator: operator.username.clone(),
    };
    let created = state
        .repos
        .roles
        .create(&role)
        .await
        .map_err(conflict_on("role"))?;
    info!("Role {} created by {}", created.keyword, operator.username);
    Ok(Envelope::success(created))
}

/// Update a role; other changes evict the admins holding the role
///
/// A keyword change runs copy-then-remove: the role's policies are granted
/// to the new keyword first, then the row is renamed and the identity cache
/// flushed, and only then are the old keyword's policies removed. A holder
/// is allowed under either keyword throughout. A failed row update takes
/// the copied policies back out.
pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Path(id): Path<i64>,
    Payload(payload): Payload<RoleRequest>,
) -> GateResult<Envelope<Role>> {
    payload.validate()?;
    let existing = role_by_id(&state, id).await?;
    rank::check_update_role(&operator, existing.sort, payload.sort)?;

    let renamed = payload.keyword != existing.keyword;
    let copied = if renamed {
        state
            .policies()
            .copy_subject(&existing.keyword, &payload.keyword)
            .await?
    } else {
        Vec::new()
    };

    let update = RoleUpdate {
        id,
        name: payload.name,
        keyword: payload.keyword,
        desc: payload.desc,
        status: payload.status,
        sort: payload.sort,
    };
    let updated = match state.repos.roles.update(&update).await {
        Ok(updated) => updated,
        Err(err) => {
            if !copied.is_empty() {
                if let Err(e) = state.policies().remove(copied).await {
                    warn!("Failed to roll back policies copied to {}: {}", update.keyword, e);
                }
            }
            return Err(conflict_on("role")(err));
        }
    };

    if renamed {
        state.cache().flush();
        state.policies().remove_subject(&existing.keyword).await?;
        info!(
            "Role keyword {} renamed to {} by {}",
            existing.keyword, updated.keyword, operator.username
        );
    } else {
        state.cache().evict_by_role(id);
    }

    info!("Role {} updated by {}", updated.keyword, operator.username);
    Ok(Envelope::success(updated))
}

/// Menus granted to the role
pub async fn menus(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> GateResult<Envelope<Vec<Menu>>> {
    let role = role_by_id(&state, id).await?;
    let ids = state.repos.roles.menu_ids(role.id).await?;
    let menus = state.repos.menus.find_by_ids(&ids).await?;
    Ok(Envelope::success(menus))
}

pub async fn update_menus(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Path(id): Path<i64>,
    Payload(payload): Payload<MenuGrantRequest>,
) -> GateResult<Envelope<()>> {
    let role = role_by_id(&state, id).await?;
    let requested: HashSet<i64> = payload.menu_ids.iter().copied().collect();
    let found = state.repos.menus.find_by_ids(&payload.menu_ids).await?;
    if found.len() != requested.len() {
        return Err(GateError::NotFound("menu"));
    }

    if !operator.is_super_admin() {
        let role_ids: Vec<i64> = operator.active_roles().map(|role| role.id).collect();
        let held: HashSet<i64> = state
            .repos
            .menus
            .for_roles(&role_ids)
            .await?
            .into_iter()
            .map(|menu| menu.id)
            .collect();
        rank::check_grant(&operator, role.sort, &requested, &held, RankViolation::GrantMenus)?;
    }

    let mut menu_ids: Vec<i64> = requested.into_iter().collect();
    menu_ids.sort_unstable();
    state.repos.roles.set_menus(role.id, &menu_ids).await?;
    info!("Menus of role {} replaced by {}", role.keyword, operator.username);
    Ok(Envelope::empty())
}

/// APIs the role's policies grant
pub async fn apis(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> GateResult<Envelope<Vec<Api>>> {
    let role = role_by_id(&state, id).await?;
    let granted: HashSet<(String, String)> = state
        .policies()
        .filtered_by_subject(&role.keyword)
        .await
        .into_iter()
        .map(|policy| (policy.object, policy.action))
        .collect();

    let (apis, _) = state.repos.apis.list(&ApiQuery::default()).await?;
    let apis = apis
        .into_iter()
        .filter(|api| granted.contains(&route_key(api)))
        .collect();
    Ok(Envelope::success(apis))
}

/// Replace the role's policy set with one policy per requested API
pub async fn update_apis(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Path(id): Path<i64>,
    Payload(payload): Payload<ApiGrantRequest>,
) -> GateResult<Envelope<()>> {
    let role = role_by_id(&state, id).await?;
    let wanted: HashSet<i64> = payload.api_ids.iter().copied().collect();
    let apis = state.repos.apis.find_by_ids(&payload.api_ids).await?;
    if apis.len() != wanted.len() {
        return Err(GateError::NotFound("api"));
    }

    if !operator.is_super_admin() {
        let requested: HashSet<(String, String)> = apis.iter().map(route_key).collect();
        let mut held = HashSet::new();
        for subject in operator.subjects() {
            held.extend(
                state
                    .policies()
                    .filtered_by_subject(&subject)
                    .await
                    .into_iter()
                    .map(|policy| (policy.object, policy.action)),
            );
        }
        rank::check_grant(&operator, role.sort, &requested, &held, RankViolation::GrantApis)?;
    }

    let policies = apis
        .iter()
        .map(|api| Policy::new(role.keyword.clone(), &api.path, &api.method))
        .collect();
    state
        .policies()
        .replace_subject(&role.keyword, policies)
        .await?;
    info!("APIs of role {} replaced by {}", role.keyword, operator.username);
    Ok(Envelope::empty())
}

/// Delete roles together with their policies
pub async fn delete_batch(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(payload): Payload<IdsRequest>,
) -> GateResult<Envelope<()>> {
    validate_ids("ids", &payload.ids)?;
    let roles = state.repos.roles.find_by_ids(&payload.ids).await?;
    for role in &roles {
        rank::check_delete_role(&operator, role.sort)?;
    }

    state.repos.roles.delete(&payload.ids).await?;
    for role in &roles {
        state.policies().remove_subject(&role.keyword).await?;
    }
    state.cache().flush();
    info!("Roles {:?} deleted by {}", payload.ids, operator.username);
    Ok(Envelope::empty())
}
