use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::{history::HistoryResponse, puzzle::PuzzleResponse, rating::RatingResponse},
    error::AppError,
    services::user_service,
    state::SharedState,
};

/// Per-user endpoints: rating lookup, puzzle selection and attempt history.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/users/{username}/rating", get(get_rating))
        .route("/users/{username}/puzzle", get(next_puzzle))
        .route("/users/{username}/history", get(get_history))
}

/// Return the user's rating, creating a default-rated user on first contact.
#[utoipa::path(
    get,
    path = "/users/{username}/rating",
    tag = "users",
    params(("username" = String, Path, description = "Opaque user identity")),
    responses(
        (status = 200, description = "Current rating", body = RatingResponse),
        (status = 400, description = "Invalid username"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_rating(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> Result<Json<RatingResponse>, AppError> {
    let rating = user_service::get_rating(&state, &username).await?;
    Ok(Json(rating))
}

/// Pick an unseen puzzle close to the user's rating.
#[utoipa::path(
    get,
    path = "/users/{username}/puzzle",
    tag = "users",
    params(("username" = String, Path, description = "Opaque user identity")),
    responses(
        (status = 200, description = "Selected puzzle", body = PuzzleResponse),
        (status = 400, description = "Invalid username"),
        (status = 404, description = "Catalog exhausted"),
        (status = 409, description = "Journal eviction conflicted with a concurrent write"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn next_puzzle(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> Result<Json<PuzzleResponse>, AppError> {
    let puzzle = user_service::next_puzzle(&state, &username).await?;
    Ok(Json(puzzle))
}

#[utoipa::path(
    get,
    path = "/users/{username}/history",
    tag = "users",
    params(("username" = String, Path, description = "Opaque user identity")),
    responses(
        (status = 200, description = "Attempt history, oldest first", body = HistoryResponse),
        (status = 404, description = "Unknown user"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_history(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = user_service::history(&state, &username).await?;
    Ok(Json(history))
}
