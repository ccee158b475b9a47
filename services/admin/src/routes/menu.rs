//! Menu management and per-admin menu access

use axum::{
    Extension, Router,
    extract::{Path, State},
    routing::{delete, get, patch, post},
};
use tracing::info;

use super::IdsRequest;
use crate::{
    AppState,
    error::{GateError, GateResult},
    extract::Payload,
    middleware::CurrentAdmin,
    models::{Menu, NewMenu, menu::build_tree},
    response::Envelope,
    validation::{validate_ids, validate_name, validate_path, validate_status},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/menu/tree", get(tree))
        .route("/menu/list", get(list))
        .route("/menu/create", post(create))
        .route("/menu/update/:menuID", patch(update))
        .route("/menu/delete/batch", delete(delete_batch))
        .route("/menu/access/list/:userID", get(access_list))
        .route("/menu/access/tree/:userID", get(access_tree))
}

fn validate(menu: &NewMenu) -> GateResult<()> {
    validate_name("name", &menu.name)?;
    validate_name("title", &menu.title)?;
    validate_path(&menu.path)?;
    validate_status(menu.status.into())?;
    Ok(())
}

pub async fn list(State(state): State<AppState>) -> GateResult<Envelope<Vec<Menu>>> {
    Ok(Envelope::success(state.repos.menus.list().await?))
}

pub async fn tree(State(state): State<AppState>) -> GateResult<Envelope<Vec<Menu>>> {
    let menus = state.repos.menus.list().await?;
    Ok(Envelope::success(build_tree(menus)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(mut payload): Payload<NewMenu>,
) -> GateResult<Envelope<Menu>> {
    validate(&payload)?;
    payload.creator = operator.username.clone();
    let created = state.repos.menus.create(&payload).await?;
    info!("Menu {} created by {}", created.name, operator.username);
    Ok(Envelope::success(created))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Payload(payload): Payload<NewMenu>,
) -> GateResult<Envelope<Menu>> {
    validate(&payload)?;
    let updated = state
        .repos
        .menus
        .update(id, &payload)
        .await?
        .ok_or(GateError::NotFound("menu"))?;
    Ok(Envelope::success(updated))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Payload(payload): Payload<IdsRequest>,
) -> GateResult<Envelope<()>> {
    validate_ids("ids", &payload.ids)?;
    state.repos.menus.delete(&payload.ids).await?;
    Ok(Envelope::empty())
}

/// Menus visible to an admin: everything for a super-admin, otherwise the
/// active menus granted to the admin's active roles
async fn accessible_menus(state: &AppState, user_id: i64) -> GateResult<Vec<Menu>> {
    let admin = state.admins().by_id(user_id).await?;
    if admin.is_super_admin() {
        return Ok(state.repos.menus.list().await?);
    }
    let role_ids: Vec<i64> = admin.active_roles().map(|role| role.id).collect();
    Ok(state.repos.menus.for_roles(&role_ids).await?)
}

pub async fn access_list(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> GateResult<Envelope<Vec<Menu>>> {
    Ok(Envelope::success(accessible_menus(&state, user_id).await?))
}

pub async fn access_tree(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> GateResult<Envelope<Vec<Menu>>> {
    let menus = accessible_menus(&state, user_id).await?;
    Ok(Envelope::success(build_tree(menus)))
}
