use auditoria_core::PublishResult;
use auditoria_model::ActionRequest;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{errors::AppResult, infra::app_state::AppState};

/// `POST /api/v1/acciones`
///
/// Validation and bus failures come back as `200` with `success: false`.
/// Only a body that is not a JSON action at all is rejected.
pub async fn publish_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> AppResult<Json<PublishResult>> {
    let Json(request) = payload?;
    Ok(Json(state.publisher.publish_request(request).await))
}
