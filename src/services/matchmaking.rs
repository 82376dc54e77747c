//! Puzzle selection: pick an unseen puzzle close to the user's rating, widening the
//! search and finally recycling the oldest journal entries when nothing is left.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::{
    config::SelectionSettings,
    dao::{
        models::PuzzleEntity,
        puzzle_store::{PuzzleStore, RatingWindow},
    },
    error::ServiceError,
    rating::Rating,
};

/// Source of uniform indices, injectable so selection can be made deterministic.
pub trait RandomSource: Send + Sync {
    /// Uniform index in `0..len`. Never called with `len == 0`.
    fn pick(&self, len: usize) -> usize;
}

/// [`RandomSource`] backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Upper bound on evict-and-retry rounds. Each round at least halves the journal,
/// so this is only reached when concurrent attempts keep refilling it.
const MAX_EVICTION_ROUNDS: u32 = 64;

/// Picks the next unseen puzzle for a user, widening the rating window and evicting
/// old journal entries when the user has seen everything.
pub struct PuzzleSelector {
    store: Arc<dyn PuzzleStore>,
    random: Arc<dyn RandomSource>,
    settings: SelectionSettings,
    defaults: Rating,
}

impl PuzzleSelector {
    /// Selector over `store`. Unknown users are created with the `defaults` rating.
    pub fn new(
        store: Arc<dyn PuzzleStore>,
        random: Arc<dyn RandomSource>,
        settings: SelectionSettings,
        defaults: Rating,
    ) -> Self {
        Self {
            store,
            random,
            settings,
            defaults,
        }
    }

    /// Pick the next puzzle for `username`, creating the user on first contact.
    ///
    /// Candidates are unseen puzzles within the rating window, then any unseen puzzle.
    /// When the user has seen the whole catalog, the oldest `floor(n / 2)` journal
    /// entries are evicted and the search restarts.
    pub async fn select(&self, username: &str) -> Result<PuzzleEntity, ServiceError> {
        let user = self
            .store
            .get_or_create_user(username, self.defaults)
            .await?;
        let window = RatingWindow::around(user.rating.rating, self.settings.rating_window);

        for round in 0..=MAX_EVICTION_ROUNDS {
            let nearby = self.store.unseen_puzzles(username, Some(window)).await?;
            if let Some(puzzle) = self.choose(nearby) {
                debug!(username, puzzle_id = puzzle.id, round, "selected puzzle in rating window");
                return Ok(puzzle);
            }

            let anywhere = self.store.unseen_puzzles(username, None).await?;
            if let Some(puzzle) = self.choose(anywhere) {
                debug!(username, puzzle_id = puzzle.id, round, "selected puzzle outside rating window");
                return Ok(puzzle);
            }

            if self.evict_oldest_half(username).await? == 0 {
                break;
            }
        }

        info!(username, "no puzzle available");
        Err(ServiceError::Exhausted {
            username: username.to_owned(),
        })
    }

    fn choose(&self, mut candidates: Vec<PuzzleEntity>) -> Option<PuzzleEntity> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.random.pick(candidates.len()).min(candidates.len() - 1);
        Some(candidates.swap_remove(index))
    }

    /// Drop the oldest half of the user's journal, returning how many entries went away.
    ///
    /// A single-entry journal is cleared entirely so that a one-puzzle catalog can
    /// still be served again.
    async fn evict_oldest_half(&self, username: &str) -> Result<usize, ServiceError> {
        let mut transaction = self.store.begin(username).await?;
        let total = transaction.journal_len().await?;
        if total == 0 {
            return Ok(0);
        }

        let count = (total / 2).max(1);
        let evicted = transaction.evict_oldest_journal(count).await?;
        transaction.commit().await?;
        info!(username, total, evicted, "recycled oldest journal entries");
        Ok(evicted)
    }
}
