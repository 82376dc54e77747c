//! Handlers' glue between the HTTP payloads and the rating, selection and recording
//! components.

use tracing::debug;
use validator::ValidationError;

use crate::{
    dto::{
        history::{HistoryResponse, JournalEntryResponse},
        puzzle::PuzzleResponse,
        rating::RatingResponse,
        solution::RecordSolutionResponse,
        validation::validate_username,
    },
    error::ServiceError,
    services::{
        attempt_recorder::{AttemptInput, AttemptRecorder},
        matchmaking::PuzzleSelector,
    },
    state::SharedState,
};

fn check_username(username: &str) -> Result<(), ServiceError> {
    validate_username(username).map_err(|err: ValidationError| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| err.code.into_owned()),
        )
    })
}

/// Current rating of `username`, creating a default-rated user when absent.
pub async fn get_rating(state: &SharedState, username: &str) -> Result<RatingResponse, ServiceError> {
    check_username(username)?;
    let store = state.require_store().await?;
    let user = store
        .get_or_create_user(username, state.config().rating.default_rating())
        .await?;
    Ok(user.rating.into())
}

/// Next puzzle for `username`.
pub async fn next_puzzle(state: &SharedState, username: &str) -> Result<PuzzleResponse, ServiceError> {
    check_username(username)?;
    let store = state.require_store().await?;
    let selector = PuzzleSelector::new(
        store,
        state.random(),
        state.config().selection.clone(),
        state.config().rating.default_rating(),
    );
    let puzzle = selector.select(username).await?;
    debug!(username, puzzle_id = puzzle.id, "serving puzzle");
    Ok(puzzle.into())
}

/// Record an attempt and return the user's updated rating.
pub async fn record_solution(
    state: &SharedState,
    attempt: AttemptInput,
) -> Result<RecordSolutionResponse, ServiceError> {
    let store = state.require_store().await?;
    let recorder = AttemptRecorder::new(
        store,
        state.engine().clone(),
        state.config().selection.difficulty_margin,
    );
    let record = recorder.record(attempt).await?;
    Ok(RecordSolutionResponse::recorded(record.user_rating))
}

/// Attempt history of an existing user, oldest first.
pub async fn history(state: &SharedState, username: &str) -> Result<HistoryResponse, ServiceError> {
    check_username(username)?;
    let store = state.require_store().await?;
    if store.find_user(username).await?.is_none() {
        return Err(ServiceError::NotFound(format!("user `{username}`")));
    }
    let entries = store
        .list_journal_for_user(username)
        .await?
        .into_iter()
        .map(JournalEntryResponse::from)
        .collect();
    Ok(HistoryResponse {
        username: username.to_owned(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::puzzle_store::{PuzzleStore, memory::MemoryPuzzleStore},
        state::AppState,
        services::test_support::{SequenceRandom, puzzle},
    };

    async fn ready_state() -> SharedState {
        let store = MemoryPuzzleStore::new();
        PuzzleStore::insert_puzzles(&store, vec![puzzle(1, 1500.0), puzzle(2, 1550.0)])
            .await
            .unwrap();
        let state = AppState::with_random(
            AppConfig::default(),
            Arc::new(SequenceRandom::new(vec![0])),
        );
        state.set_store(Arc::new(store), "memory").await;
        state
    }

    #[tokio::test]
    async fn rating_creates_default_user() {
        let state = ready_state().await;
        let rating = get_rating(&state, "newcomer").await.unwrap();
        assert_eq!(rating.rating, 1500.0);
        assert_eq!(rating.rating_deviation, 350.0);
        assert_eq!(rating.volatility, 0.06);
    }

    #[tokio::test]
    async fn play_then_history() {
        let state = ready_state().await;
        let served = next_puzzle(&state, "alice").await.unwrap();
        assert_eq!(served.id, 1);

        let response = record_solution(
            &state,
            AttemptInput {
                username: "alice".into(),
                puzzle_id: served.id,
                success: true,
                time: Duration::from_secs(9),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.status, "ok");
        assert!(response.rating > 1500.0);

        let next = next_puzzle(&state, "alice").await.unwrap();
        assert_eq!(next.id, 2);

        let history = history(&state, "alice").await.unwrap();
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].puzzle_id, 1);
    }

    #[tokio::test]
    async fn history_of_unknown_user_is_not_found() {
        let state = ready_state().await;
        assert!(matches!(
            history(&state, "ghost").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            get_rating(&state, "has space").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn degraded_state_rejects_requests() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            get_rating(&state, "alice").await,
            Err(ServiceError::Degraded)
        ));
    }
}
