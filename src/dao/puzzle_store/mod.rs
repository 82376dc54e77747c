pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    JournalEntryEntity, NewJournalEntry, PuzzleEntity, PuzzleId, UserEntity,
};
use crate::dao::storage::StorageResult;
use crate::rating::Rating;
use futures::future::BoxFuture;

/// Inclusive rating interval used to narrow the puzzle catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingWindow {
    /// Lowest accepted rating.
    pub min: f64,
    /// Highest accepted rating.
    pub max: f64,
}

impl RatingWindow {
    /// Window of `radius` points on both sides of `rating`.
    pub fn around(rating: f64, radius: f64) -> Self {
        Self {
            min: rating - radius,
            max: rating + radius,
        }
    }

    /// Whether `rating` lies within the window, bounds included.
    pub fn contains(&self, rating: f64) -> bool {
        self.min <= rating && rating <= self.max
    }
}

/// Abstraction over the persistence layer for users, puzzles and the attempt journal.
pub trait PuzzleStore: Send + Sync {
    /// Fetch a user, creating it with the `defaults` rating when absent.
    fn get_or_create_user(
        &self,
        username: &str,
        defaults: Rating,
    ) -> BoxFuture<'static, StorageResult<UserEntity>>;
    /// Fetch a user without creating it.
    fn find_user(&self, username: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Fetch a puzzle by id.
    fn find_puzzle(&self, id: PuzzleId) -> BoxFuture<'static, StorageResult<Option<PuzzleEntity>>>;
    /// Puzzles absent from the user's journal, optionally limited to a rating window.
    ///
    /// Journal and catalog are read from one consistent snapshot.
    fn unseen_puzzles(
        &self,
        username: &str,
        window: Option<RatingWindow>,
    ) -> BoxFuture<'static, StorageResult<Vec<PuzzleEntity>>>;
    /// Journal of a user, oldest first.
    fn list_journal_for_user(
        &self,
        username: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<JournalEntryEntity>>>;
    /// Insert catalog entries whose id is not stored yet, returning how many were inserted.
    ///
    /// Existing puzzles are left untouched.
    fn insert_puzzles(&self, puzzles: Vec<PuzzleEntity>) -> BoxFuture<'static, StorageResult<usize>>;
    /// Open a transaction serialized on the user's row.
    fn begin(&self, username: &str) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>>;
    /// Check that the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Unit of work opened by [`PuzzleStore::begin`].
///
/// Writes become visible on [`StoreTransaction::commit`]; dropping the transaction
/// discards them and releases the row locks.
pub trait StoreTransaction: Send {
    /// The user the transaction is bound to, if it exists.
    fn user(&mut self) -> BoxFuture<'_, StorageResult<Option<UserEntity>>>;
    /// Lock a puzzle row for the rest of the transaction and return it.
    fn lock_puzzle(&mut self, id: PuzzleId) -> BoxFuture<'_, StorageResult<Option<PuzzleEntity>>>;
    /// Whether the user's journal already holds an entry for `puzzle_id`.
    fn has_attempted(&mut self, puzzle_id: PuzzleId) -> BoxFuture<'_, StorageResult<bool>>;
    /// Number of journal entries the user holds, pending writes included.
    fn journal_len(&mut self) -> BoxFuture<'_, StorageResult<usize>>;
    /// Store the bound user's new rating.
    fn save_user_rating(&mut self, rating: Rating) -> BoxFuture<'_, StorageResult<()>>;
    /// Store the puzzle's new rating, bumping its solve counter when `solved`.
    fn save_puzzle_rating(
        &mut self,
        id: PuzzleId,
        rating: Rating,
        solved: bool,
    ) -> BoxFuture<'_, StorageResult<()>>;
    /// Append a journal entry for the bound user, returning it with its assigned id.
    fn append_journal(
        &mut self,
        entry: NewJournalEntry,
    ) -> BoxFuture<'_, StorageResult<JournalEntryEntity>>;
    /// Remove the user's `count` oldest journal entries, returning how many were removed.
    fn evict_oldest_journal(&mut self, count: usize) -> BoxFuture<'_, StorageResult<usize>>;
    /// Make every write of the transaction visible at once.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
