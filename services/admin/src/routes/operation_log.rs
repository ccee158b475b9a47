use axum::{
    Router,
    extract::{Query, State},
    routing::{delete, get},
};

use super::IdsRequest;
use crate::{
    AppState,
    error::GateResult,
    extract::Payload,
    models::{OperationLog, OperationLogQuery},
    response::{Envelope, PageData},
    validation::validate_ids,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/log/operation/list", get(list))
        .route("/log/operation/delete/batch", delete(delete_batch))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<OperationLogQuery>,
) -> GateResult<Envelope<PageData<OperationLog>>> {
    let page = state.repos.logs.list(&query).await?;
    Ok(Envelope::success(PageData::new(page)))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Payload(payload): Payload<IdsRequest>,
) -> GateResult<Envelope<()>> {
    validate_ids("ids", &payload.ids)?;
    state.repos.logs.delete(&payload.ids).await?;
    Ok(Envelope::empty())
}
