use std::time::Duration;

use serde::Serialize;
use serde_with::{DurationSecondsWithFrac, serde_as};
use utoipa::ToSchema;

use crate::dao::models::{Difficulty, JournalEntryEntity};

use super::format_system_time;

/// Difficulty bucket of an attempt.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyDto {
    Easy,
    Normal,
    Hard,
}

impl From<Difficulty> for DifficultyDto {
    fn from(value: Difficulty) -> Self {
        match value {
            Difficulty::Easy => DifficultyDto::Easy,
            Difficulty::Normal => DifficultyDto::Normal,
            Difficulty::Hard => DifficultyDto::Hard,
        }
    }
}

/// One recorded attempt.
#[serde_as]
#[derive(Debug, Serialize, ToSchema)]
pub struct JournalEntryResponse {
    pub id: u64,
    pub puzzle_id: u64,
    pub success: bool,
    /// Seconds spent on the puzzle.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[schema(value_type = f64)]
    pub time: Duration,
    pub puzzle_rating_before: f64,
    pub user_rating_after: f64,
    pub difficulty: DifficultyDto,
    /// RFC 3339 timestamp of the attempt.
    pub created_at: String,
}

impl From<JournalEntryEntity> for JournalEntryResponse {
    fn from(value: JournalEntryEntity) -> Self {
        Self {
            id: value.id,
            puzzle_id: value.puzzle_id,
            success: value.success,
            time: value.time,
            puzzle_rating_before: value.puzzle_rating_before,
            user_rating_after: value.user_rating_after,
            difficulty: value.difficulty.into(),
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Attempt history of a user, oldest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub username: String,
    pub entries: Vec<JournalEntryResponse>,
}
