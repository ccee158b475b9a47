//! API descriptor management
//!
//! Descriptors mirror policy objects, so renaming or deleting one rewrites
//! or removes the matching policies.

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
};
use tracing::info;

use super::IdsRequest;
use crate::{
    AppState,
    error::{GateError, GateResult},
    extract::Payload,
    middleware::CurrentAdmin,
    models::{
        Api, ApiQuery, ApiTreeNode, NewApi,
        api::group_by_category,
        policy::{canonical_action, canonical_object},
    },
    response::{Envelope, PageData},
    store::conflict_on,
    validation::{validate_ids, validate_method, validate_name, validate_path},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/list", get(list))
        .route("/api/tree", get(tree))
        .route("/api/create", post(create))
        .route("/api/update/:apiID", patch(update))
        .route("/api/delete/batch", delete(delete_batch))
}

fn validate(api: &NewApi) -> GateResult<()> {
    validate_method(&api.method)?;
    validate_path(&api.path)?;
    validate_name("category", &api.category)?;
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ApiQuery>,
) -> GateResult<Envelope<PageData<Api>>> {
    let page = state.repos.apis.list(&query).await?;
    Ok(Envelope::success(PageData::new(page)))
}

/// All descriptors grouped by category
pub async fn tree(State(state): State<AppState>) -> GateResult<Envelope<Vec<ApiTreeNode>>> {
    let (apis, _) = state.repos.apis.list(&ApiQuery::default()).await?;
    Ok(Envelope::success(group_by_category(apis)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentAdmin(operator)): Extension<CurrentAdmin>,
    Payload(mut payload): Payload<NewApi>,
) -> GateResult<Envelope<Api>> {
    validate(&payload)?;
    payload.method = canonical_action(&payload.method);
    payload.creator = operator.username.clone();

    let created = state
        .repos
        .apis
        .create(&payload)
        .await
        .map_err(conflict_on("api"))?;
    info!(
        "API {} {} created by {}",
        created.method, created.path, operator.username
    );
    Ok(Envelope::success(created))
}

/// Update a descriptor and carry its policies over to the new route
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Payload(mut payload): Payload<NewApi>,
) -> GateResult<Envelope<Api>> {
    validate(&payload)?;
    payload.method = canonical_action(&payload.method);

    let existing = state
        .repos
        .apis
        .find_by_id(id)
        .await?
        .ok_or(GateError::NotFound("api"))?;
    let updated = state
        .repos
        .apis
        .update(id, &payload)
        .await
        .map_err(conflict_on("api"))?
        .ok_or(GateError::NotFound("api"))?;

    let moved = canonical_object(&existing.path) != canonical_object(&updated.path)
        || canonical_action(&existing.method) != canonical_action(&updated.method);
    if moved {
        state
            .policies()
            .rename_object(
                &existing.path,
                &existing.method,
                &updated.path,
                &updated.method,
            )
            .await?;
    }
    Ok(Envelope::success(updated))
}

/// Delete descriptors and every policy on their routes
pub async fn delete_batch(
    State(state): State<AppState>,
    Payload(payload): Payload<IdsRequest>,
) -> GateResult<Envelope<()>> {
    validate_ids("ids", &payload.ids)?;
    let apis = state.repos.apis.find_by_ids(&payload.ids).await?;
    state.repos.apis.delete(&payload.ids).await?;
    for api in &apis {
        state.policies().remove_object(&api.path, &api.method).await?;
    }
    Ok(Envelope::empty())
}
