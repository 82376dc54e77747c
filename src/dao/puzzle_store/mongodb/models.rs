use std::time::Duration;

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{
        Difficulty, JournalEntryEntity, PuzzleEntity, PuzzleId, Side, UserEntity,
    },
    rating::Rating,
};

pub const USER_COLLECTION_NAME: &str = "users";
pub const PUZZLE_COLLECTION_NAME: &str = "puzzles";
pub const JOURNAL_COLLECTION_NAME: &str = "journal";
pub const COUNTER_COLLECTION_NAME: &str = "counters";
pub const JOURNAL_COUNTER_ID: &str = "journal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    pub username: String,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    pub active: bool,
    /// Bumped by every transaction touching the user so concurrent writers conflict.
    #[serde(default)]
    pub revision: i64,
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            username: value.username,
            rating: Rating::new(value.rating, value.rating_deviation, value.volatility),
            active: value.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPuzzleDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub fen1: String,
    pub move1: String,
    pub fen2: String,
    pub move2: String,
    pub solution: bool,
    pub color: Side,
    pub type_id: i64,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    #[serde(default)]
    pub solve_count: i64,
    #[serde(default)]
    pub revision: i64,
}

impl TryFrom<PuzzleEntity> for MongoPuzzleDocument {
    type Error = MongoDaoError;

    fn try_from(value: PuzzleEntity) -> MongoResult<Self> {
        Ok(Self {
            id: id_to_bson(value.id)?,
            fen1: value.fen1,
            move1: value.move1,
            fen2: value.fen2,
            move2: value.move2,
            solution: value.solution,
            color: value.color,
            type_id: i64::from(value.type_id),
            rating: value.rating.rating,
            rating_deviation: value.rating.deviation,
            volatility: value.rating.volatility,
            solve_count: i64::try_from(value.solve_count).unwrap_or(i64::MAX),
            revision: 0,
        })
    }
}

impl From<MongoPuzzleDocument> for PuzzleEntity {
    fn from(value: MongoPuzzleDocument) -> Self {
        Self {
            id: id_from_bson(value.id),
            fen1: value.fen1,
            move1: value.move1,
            fen2: value.fen2,
            move2: value.move2,
            solution: value.solution,
            color: value.color,
            type_id: u32::try_from(value.type_id).unwrap_or_default(),
            rating: Rating::new(value.rating, value.rating_deviation, value.volatility),
            solve_count: u64::try_from(value.solve_count).unwrap_or_default(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoJournalDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user: String,
    pub puzzle_id: i64,
    pub success: bool,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub time: Duration,
    pub puzzle_rating_before: f64,
    pub user_rating_after: f64,
    pub difficulty: Difficulty,
    pub created_at: DateTime,
}

impl TryFrom<JournalEntryEntity> for MongoJournalDocument {
    type Error = MongoDaoError;

    fn try_from(value: JournalEntryEntity) -> MongoResult<Self> {
        Ok(Self {
            id: id_to_bson(value.id)?,
            user: value.username,
            puzzle_id: id_to_bson(value.puzzle_id)?,
            success: value.success,
            time: value.time,
            puzzle_rating_before: value.puzzle_rating_before,
            user_rating_after: value.user_rating_after,
            difficulty: value.difficulty,
            created_at: DateTime::from_system_time(value.created_at),
        })
    }
}

impl From<MongoJournalDocument> for JournalEntryEntity {
    fn from(value: MongoJournalDocument) -> Self {
        Self {
            id: id_from_bson(value.id),
            username: value.user,
            puzzle_id: id_from_bson(value.puzzle_id),
            success: value.success,
            time: value.time,
            puzzle_rating_before: value.puzzle_rating_before,
            user_rating_after: value.user_rating_after,
            difficulty: value.difficulty,
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCounterDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}

/// Ids are stored as BSON `int64`; ids above `i64::MAX` have no stored form.
pub fn id_to_bson(id: PuzzleId) -> MongoResult<i64> {
    i64::try_from(id).map_err(|_| MongoDaoError::IdOutOfRange { id })
}

/// Negative stored ids are read back as 0.
pub fn id_from_bson(id: i64) -> PuzzleId {
    u64::try_from(id).unwrap_or_default()
}

pub fn doc_id(id: PuzzleId) -> MongoResult<Document> {
    Ok(doc! {"_id": id_to_bson(id)?})
}

/// Journal ordering used everywhere "oldest first" matters.
pub fn oldest_first() -> Document {
    doc! {"created_at": 1, "_id": 1}
}
