use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::rating::Rating;

/// Identifier of a puzzle in the catalog.
pub type PuzzleId = u64;
/// Identifier of a journal entry, strictly increasing in insertion order.
pub type JournalId = u64;

/// Rating-bearing user, keyed by its opaque username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntity {
    /// Stable identity (e.g. a Telegram username).
    pub username: String,
    /// Current rating triple.
    pub rating: Rating,
    /// Whether the account is enabled.
    pub active: bool,
}

impl UserEntity {
    /// Build a fresh active user with the provided default rating.
    pub fn new(username: impl Into<String>, rating: Rating) -> Self {
        Self {
            username: username.into(),
            rating,
            active: true,
        }
    }
}

/// Side to move in the first position of a puzzle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Side {
    /// Parse the side-to-move field of a FEN string.
    pub fn from_fen_field(field: &str) -> Option<Self> {
        match field {
            "w" => Some(Side::White),
            "b" => Some(Side::Black),
            _ => None,
        }
    }
}

/// Catalog entry: two positions linked by `move1`, and a candidate answer `move2`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PuzzleEntity {
    /// Primary key of the puzzle.
    pub id: PuzzleId,
    /// Position before `move1`.
    pub fen1: String,
    /// First move, played from `fen1`.
    pub move1: String,
    /// Position after `move1`.
    pub fen2: String,
    /// Candidate response played from `fen2`.
    pub move2: String,
    /// Whether `move2` is the correct response.
    pub solution: bool,
    /// Side to move in `fen1`.
    pub color: Side,
    /// Category of the puzzle (best move, missed defense, trap...).
    pub type_id: u32,
    /// Rating triple, updated like a user's after each attempt.
    pub rating: Rating,
    /// Number of successful attempts.
    pub solve_count: u64,
}

/// Difficulty of an attempt relative to the user's rating at the time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    /// Classify the gap between a puzzle and a user rating.
    pub fn classify(puzzle_rating: f64, user_rating: f64, margin: f64) -> Self {
        let gap = puzzle_rating - user_rating;
        if gap < -margin {
            Difficulty::Easy
        } else if gap > margin {
            Difficulty::Hard
        } else {
            Difficulty::Normal
        }
    }
}

/// Journal entry waiting to be appended; the store assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJournalEntry {
    pub username: String,
    pub puzzle_id: PuzzleId,
    pub success: bool,
    /// Time the user spent on the puzzle.
    pub time: Duration,
    pub puzzle_rating_before: f64,
    pub user_rating_after: f64,
    pub difficulty: Difficulty,
    pub created_at: SystemTime,
}

/// Immutable record of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntryEntity {
    pub id: JournalId,
    pub username: String,
    pub puzzle_id: PuzzleId,
    pub success: bool,
    pub time: Duration,
    pub puzzle_rating_before: f64,
    pub user_rating_after: f64,
    pub difficulty: Difficulty,
    pub created_at: SystemTime,
}

impl JournalEntryEntity {
    pub fn from_new(id: JournalId, entry: NewJournalEntry) -> Self {
        Self {
            id,
            username: entry.username,
            puzzle_id: entry.puzzle_id,
            success: entry.success,
            time: entry.time,
            puzzle_rating_before: entry.puzzle_rating_before,
            user_rating_after: entry.user_rating_after,
            difficulty: entry.difficulty,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_uses_symmetric_margin() {
        assert_eq!(Difficulty::classify(1350.0, 1500.0, 100.0), Difficulty::Easy);
        assert_eq!(Difficulty::classify(1400.0, 1500.0, 100.0), Difficulty::Normal);
        assert_eq!(Difficulty::classify(1600.0, 1500.0, 100.0), Difficulty::Normal);
        assert_eq!(Difficulty::classify(1650.0, 1500.0, 100.0), Difficulty::Hard);
    }

    #[test]
    fn side_parses_fen_field() {
        assert_eq!(Side::from_fen_field("w"), Some(Side::White));
        assert_eq!(Side::from_fen_field("b"), Some(Side::Black));
        assert_eq!(Side::from_fen_field("W"), None);
    }
}
