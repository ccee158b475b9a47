//! Admin account management

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    routing::{delete, get, patch, post, put},
};
use serde::Deserialize;
use tracing::info;

use super::{IdsRequest, resolve_roles};
use crate::{
    AppState,
    error::GateResult,
    extract::Payload,
    middleware::CurrentAdmin,
    models::{Admin, AdminQuery, AdminUpdate, NewAdmin, Status},
    password::{hash_password, verify_password},
    rank,
    response::{Envelope, PageData},
    validation::{
        ValidationError, validate_ids, validate_password, validate_status, validate_username,
    },
};

/// Password given to accounts created without one
const DEFAULT_PASSWORD: &str = "123456";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/info", get(info).post(info))
        .route("/admin/list", get(list))
        .route("/admin/changePwd", put(change_password))
        .route("/admin/create", post(create))
        .route("/admin/update/:userID", patch(update))
        .route("/admin/delete/batch", delete(delete_batch))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Body of create and update; an empty password keeps the default or the
/// stored one
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub avatar: String,
    pub nickname: Option<String>,
    pub introduction: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub role_ids: Vec<i64>,
}

impl AdminRequest {
    fn validate(&self) -> GateResult<()> {
        validate_username(&self.username)?;
        if !self.password.is_empty() {
            validate_password("password", &self.password)?;
        }
        validate_status(self.status.into())?;
        validate_ids("roleIds", &self.role_ids)?;
        Ok(())
    }
}

/// The current admin
pub async fn info(Extension(CurrentAdmin(admin)): Extension<CurrentAdmin>) -> Envelope<Admin> {
    Envelope::success(admin)
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> GateResult<Envelope<PageData<Admin>>> {
    let page = state.repos.admins.list(&query).await?;
    Ok(Envelope::success(PageData::new(page)))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentAdmin(admin)): Extension<CurrentAdmin>,
    Payload(payload): Payload<ChangePasswordRequest>,
) -> GateResult<Envelope<()>> {
    validate_password("newPassword", &payload.new_password)?;
    if !verify_password(&admin.password, &payload.old_password) {
        return Err(ValidationError::new("oldPassword", "mismatch").into());
    }

    let digest = hash_password(&payload.new_password)?;
    state
        .admins()
        .change_password(&admin.username, &digest)
        .await?;
    info!("Admin {} changed password", admin.username);
    Ok(Envelope::empty())
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(payload): Payload<AdminRequest>,
) -> GateResult<Envelope<Admin>> {
    payload.validate()?;
    let roles = resolve_roles(&state, &payload.role_ids).await?;
    rank::check_create_admin(&operator, &roles)?;

    let plaintext = if payload.password.is_empty() {
        DEFAULT_PASSWORD
    } else {
        payload.password.as_str()
    };
    let admin = NewAdmin {
        password: hash_password(plaintext)?,
        username: payload.username,
        mobile: payload.mobile,
        avatar: payload.avatar,
        nickname: payload.nickname,
        introduction: payload.introduction,
        status: payload.status,
        creator: operator.username.clone(),
        role_ids: payload.role_ids,
    };

    let created = state.admins().create(&admin).await?;
    info!("Admin {} created by {}", created.username, operator.username);
    Ok(Envelope::success(created))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Path(id): Path<i64>,
    Payload(payload): Payload<AdminRequest>,
) -> GateResult<Envelope<Admin>> {
    payload.validate()?;
    let target = state.admins().by_id(id).await?;
    let roles = resolve_roles(&state, &payload.role_ids).await?;

    let mut update = AdminUpdate {
        id,
        username: payload.username,
        password: (!payload.password.is_empty()).then_some(payload.password),
        mobile: payload.mobile,
        avatar: payload.avatar,
        nickname: payload.nickname,
        introduction: payload.introduction,
        status: payload.status,
        role_ids: payload.role_ids,
    };
    rank::check_update_admin(&operator, &target, &update, &roles)?;

    if let Some(plaintext) = update.password.take() {
        update.password = Some(hash_password(&plaintext)?);
    }
    let updated = state.admins().update(&target.username, &update).await?;
    info!("Admin {} updated by {}", updated.username, operator.username);
    Ok(Envelope::success(updated))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(payload): Payload<IdsRequest>,
) -> GateResult<Envelope<()>> {
    validate_ids("ids", &payload.ids)?;
    let targets = state.admins().min_ranks_of(&payload.ids).await?;
    rank::check_delete_admins(&operator, &targets)?;

    state.admins().delete(&payload.ids).await?;
    info!("Admins {:?} deleted by {}", payload.ids, operator.username);
    Ok(Envelope::empty())
}
