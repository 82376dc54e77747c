use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};

use crate::{
    dto::solution::{RecordSolutionRequest, RecordSolutionResponse},
    error::AppError,
    services::{attempt_recorder::AttemptInput, user_service},
    state::SharedState,
};

/// Routes recording puzzle attempts.
pub fn router() -> Router<SharedState> {
    Router::new().route("/solutions", post(record_solution))
}

/// Record the outcome of a puzzle attempt and re-rate both the user and the puzzle.
#[utoipa::path(
    post,
    path = "/solutions",
    tag = "solutions",
    request_body = RecordSolutionRequest,
    responses(
        (status = 200, description = "Attempt recorded", body = RecordSolutionResponse),
        (status = 400, description = "Missing or malformed fields"),
        (status = 404, description = "Unknown user or puzzle"),
        (status = 409, description = "Puzzle already attempted by this user, or a concurrent write conflicted"),
        (status = 500, description = "Rating update failed"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn record_solution(
    State(state): State<SharedState>,
    payload: Result<Json<RecordSolutionRequest>, JsonRejection>,
) -> Result<Json<RecordSolutionResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let attempt = AttemptInput::try_from(payload)?;
    let response = user_service::record_solution(&state, attempt).await?;
    Ok(Json(response))
}
