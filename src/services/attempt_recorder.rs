//! Records one attempt atomically: both rating updates, the journal entry and the
//! solve counter are written in a single store transaction or not at all.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{info, warn};

use crate::{
    dao::{
        models::{Difficulty, JournalEntryEntity, NewJournalEntry, PuzzleId},
        puzzle_store::PuzzleStore,
    },
    error::ServiceError,
    rating::{Outcome, Rating, RatingEngine},
};

/// Validated attempt submitted by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInput {
    pub username: String,
    pub puzzle_id: PuzzleId,
    pub success: bool,
    pub time: Duration,
}

/// Ratings after a recorded attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// User rating after the update.
    pub user_rating: Rating,
    /// Puzzle rating after the update.
    pub puzzle_rating: Rating,
    /// Journal entry written for the attempt.
    pub entry: JournalEntryEntity,
}

/// Records attempts atomically. Rating updates and the journal entry are committed
/// together or not at all.
pub struct AttemptRecorder {
    store: Arc<dyn PuzzleStore>,
    engine: RatingEngine,
    difficulty_margin: f64,
}

impl AttemptRecorder {
    /// `difficulty_margin` is the rating gap beyond which an attempt counts as easy or hard.
    pub fn new(store: Arc<dyn PuzzleStore>, engine: RatingEngine, difficulty_margin: f64) -> Self {
        Self {
            store,
            engine,
            difficulty_margin,
        }
    }

    /// Re-rate the user and the puzzle after `attempt` and journal it.
    ///
    /// Fails with `NotFound` for unknown users or puzzles and with `DuplicateAttempt` when
    /// the user already attempted the puzzle. Nothing is written on failure.
    pub async fn record(&self, attempt: AttemptInput) -> Result<AttemptRecord, ServiceError> {
        let AttemptInput {
            username,
            puzzle_id,
            success,
            time,
        } = attempt;

        // Locks the user row first, then the puzzle row.
        let mut transaction = self.store.begin(&username).await?;
        let user = transaction
            .user()
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user `{username}`")))?;
        let puzzle = transaction
            .lock_puzzle(puzzle_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("puzzle {puzzle_id}")))?;

        if transaction.has_attempted(puzzle_id).await? {
            return Err(ServiceError::DuplicateAttempt {
                username,
                puzzle_id,
            });
        }

        let outcome = Outcome::from(success);
        let user_rating = self
            .engine
            .update(&user.rating, &puzzle.rating, outcome)
            .inspect_err(|err| {
                warn!(username = %username, puzzle_id, error = %err, "user rating update failed")
            })?;
        let puzzle_rating = self
            .engine
            .update(&puzzle.rating, &user.rating, !outcome)
            .inspect_err(|err| {
                warn!(username = %username, puzzle_id, error = %err, "puzzle rating update failed")
            })?;

        transaction.save_user_rating(user_rating).await?;
        transaction
            .save_puzzle_rating(puzzle_id, puzzle_rating, success)
            .await?;
        let entry = transaction
            .append_journal(NewJournalEntry {
                username: username.clone(),
                puzzle_id,
                success,
                time,
                puzzle_rating_before: puzzle.rating.rating,
                user_rating_after: user_rating.rating,
                difficulty: Difficulty::classify(
                    puzzle.rating.rating,
                    user.rating.rating,
                    self.difficulty_margin,
                ),
                created_at: SystemTime::now(),
            })
            .await?;
        transaction.commit().await?;

        info!(
            username = %username,
            puzzle_id,
            success,
            rating = user_rating.rating,
            rating_deviation = user_rating.deviation,
            "attempt recorded"
        );
        Ok(AttemptRecord {
            user_rating,
            puzzle_rating,
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::puzzle_store::memory::MemoryPuzzleStore,
        rating::{RatingError, RatingSettings},
        services::test_support::puzzle,
    };

    const FRESH: Rating = Rating {
        rating: 1500.0,
        deviation: 350.0,
        volatility: 0.06,
    };

    async fn seeded() -> MemoryPuzzleStore {
        let store = MemoryPuzzleStore::new();
        PuzzleStore::insert_puzzles(&store, vec![puzzle(1, 1500.0), puzzle(2, 1800.0)])
            .await
            .unwrap();
        PuzzleStore::get_or_create_user(&store, "alice", FRESH)
            .await
            .unwrap();
        store
    }

    fn recorder(store: &MemoryPuzzleStore, settings: RatingSettings) -> AttemptRecorder {
        AttemptRecorder::new(Arc::new(store.clone()), RatingEngine::new(settings), 100.0)
    }

    fn attempt(puzzle_id: PuzzleId, success: bool) -> AttemptInput {
        AttemptInput {
            username: "alice".into(),
            puzzle_id,
            success,
            time: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn success_moves_ratings_apart() {
        let store = seeded().await;
        let record = recorder(&store, RatingSettings::default())
            .record(attempt(1, true))
            .await
            .unwrap();

        assert!((record.user_rating.rating - 1662.3109).abs() < 1e-3);
        assert!((record.puzzle_rating.rating - 1337.689).abs() < 1e-3);
        assert!(record.user_rating.deviation < 350.0);

        let user = PuzzleStore::find_user(&store, "alice").await.unwrap().unwrap();
        assert_eq!(user.rating, record.user_rating);
        let stored = PuzzleStore::find_puzzle(&store, 1).await.unwrap().unwrap();
        assert_eq!(stored.rating, record.puzzle_rating);
        assert_eq!(stored.solve_count, 1);

        let journal = PuzzleStore::list_journal_for_user(&store, "alice")
            .await
            .unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].puzzle_rating_before, 1500.0);
        assert_eq!(journal[0].user_rating_after, record.user_rating.rating);
        assert_eq!(journal[0].difficulty, Difficulty::Normal);
    }

    #[tokio::test]
    async fn failure_keeps_solve_count_and_lowers_user() {
        let store = seeded().await;
        let record = recorder(&store, RatingSettings::default())
            .record(attempt(2, false))
            .await
            .unwrap();

        assert!(record.user_rating.rating < 1500.0);
        assert!(record.puzzle_rating.rating > 1800.0);
        assert_eq!(record.entry.difficulty, Difficulty::Hard);
        let stored = PuzzleStore::find_puzzle(&store, 2).await.unwrap().unwrap();
        assert_eq!(stored.solve_count, 0);
    }

    #[tokio::test]
    async fn duplicate_attempt_is_rejected_without_side_effects() {
        let store = seeded().await;
        let recorder = recorder(&store, RatingSettings::default());
        let first = recorder.record(attempt(1, true)).await.unwrap();

        let err = recorder.record(attempt(1, false)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::DuplicateAttempt { puzzle_id: 1, .. }
        ));

        let user = PuzzleStore::find_user(&store, "alice").await.unwrap().unwrap();
        assert_eq!(user.rating, first.user_rating);
        let stored = PuzzleStore::find_puzzle(&store, 1).await.unwrap().unwrap();
        assert_eq!(stored.rating, first.puzzle_rating);
        assert_eq!(stored.solve_count, 1);
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let store = seeded().await;
        let recorder = recorder(&store, RatingSettings::default());

        let err = recorder.record(attempt(99, true)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let mut stranger = attempt(1, true);
        stranger.username = "mallory".into();
        let err = recorder.record(stranger).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(PuzzleStore::find_user(&store, "mallory").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_convergent_update_leaves_ratings_unchanged() {
        let store = seeded().await;
        let settings = RatingSettings {
            max_iterations: 1,
            ..RatingSettings::default()
        };
        let err = recorder(&store, settings)
            .record(attempt(1, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NonConvergent(RatingError::NonConvergent { .. })
        ));

        let user = PuzzleStore::find_user(&store, "alice").await.unwrap().unwrap();
        assert_eq!(user.rating, FRESH);
        let stored = PuzzleStore::find_puzzle(&store, 1).await.unwrap().unwrap();
        assert_eq!(stored.rating.rating, 1500.0);
        assert!(
            PuzzleStore::list_journal_for_user(&store, "alice")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_attempts_of_one_user_apply_in_sequence() {
        const ATTEMPTS: u64 = 8;
        let store = MemoryPuzzleStore::new();
        let catalog = (1..=ATTEMPTS)
            .map(|id| puzzle(id, 1300.0 + 50.0 * id as f64))
            .collect();
        PuzzleStore::insert_puzzles(&store, catalog).await.unwrap();
        PuzzleStore::get_or_create_user(&store, "alice", FRESH)
            .await
            .unwrap();

        let recorder = Arc::new(recorder(&store, RatingSettings::default()));
        let tasks: Vec<_> = (1..=ATTEMPTS)
            .map(|id| {
                let recorder = recorder.clone();
                tokio::spawn(async move { recorder.record(attempt(id, id % 2 == 0)).await })
            })
            .collect();
        let mut records = Vec::new();
        for task in tasks {
            records.push(task.await.unwrap().unwrap());
        }
        records.sort_by_key(|record| record.entry.id);

        let journal = PuzzleStore::list_journal_for_user(&store, "alice")
            .await
            .unwrap();
        assert_eq!(journal.len(), ATTEMPTS as usize);

        let last = records.last().unwrap();
        let user = PuzzleStore::find_user(&store, "alice").await.unwrap().unwrap();
        assert_eq!(user.rating, last.user_rating);

        // Each update starts from the rating the previous commit left behind.
        let engine = RatingEngine::new(RatingSettings::default());
        let mut expected = FRESH;
        for record in &records {
            let opponent = Rating::new(record.entry.puzzle_rating_before, 350.0, 0.06);
            expected = engine
                .update(&expected, &opponent, Outcome::from(record.entry.success))
                .unwrap();
            assert_eq!(record.user_rating, expected);
        }
    }
}
