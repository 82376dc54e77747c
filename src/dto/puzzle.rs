use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{PuzzleEntity, Side};

/// Whether the candidate move of a puzzle is correct.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
pub enum Verdict {
    Good,
    Blunder,
}

impl From<bool> for Verdict {
    fn from(correct: bool) -> Self {
        if correct {
            Verdict::Good
        } else {
            Verdict::Blunder
        }
    }
}

/// Side to move, serialized as in FEN.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
pub enum ColorDto {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl From<Side> for ColorDto {
    fn from(value: Side) -> Self {
        match value {
            Side::White => ColorDto::White,
            Side::Black => ColorDto::Black,
        }
    }
}

/// Puzzle served to a user.
#[derive(Debug, Serialize, ToSchema)]
pub struct PuzzleResponse {
    pub id: u64,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    /// Position before `move1`.
    pub fen1: String,
    pub move1: String,
    /// Position after `move1`, where `move2` is played.
    pub fen2: String,
    pub move2: String,
    pub solution: Verdict,
    pub color: ColorDto,
    pub type_id: u32,
}

impl From<PuzzleEntity> for PuzzleResponse {
    fn from(value: PuzzleEntity) -> Self {
        Self {
            id: value.id,
            rating: value.rating.rating,
            rating_deviation: value.rating.deviation,
            volatility: value.rating.volatility,
            fen1: value.fen1,
            move1: value.move1,
            fen2: value.fen2,
            move2: value.move2,
            solution: value.solution.into(),
            color: value.color.into(),
            type_id: value.type_id,
        }
    }
}
