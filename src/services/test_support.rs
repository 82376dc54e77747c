//! Fixtures shared by the service tests.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime},
};

use super::matchmaking::RandomSource;
use crate::{
    dao::models::{Difficulty, NewJournalEntry, PuzzleEntity, PuzzleId, Side},
    rating::Rating,
};

/// Replays a fixed list of indices, cycling once exhausted.
pub struct SequenceRandom {
    picks: Vec<usize>,
    cursor: AtomicUsize,
}

impl SequenceRandom {
    pub fn new(picks: Vec<usize>) -> Self {
        Self {
            picks,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn pick(&self, len: usize) -> usize {
        if self.picks.is_empty() {
            return 0;
        }
        let position = self.cursor.fetch_add(1, Ordering::SeqCst) % self.picks.len();
        self.picks[position] % len
    }
}

pub fn puzzle(id: PuzzleId, rating: f64) -> PuzzleEntity {
    PuzzleEntity {
        id,
        fen1: "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3".into(),
        move1: "f1b5".into(),
        fen2: "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3".into(),
        move2: "a7a6".into(),
        solution: true,
        color: Side::White,
        type_id: 1,
        rating: Rating::new(rating, 350.0, 0.06),
        solve_count: 0,
    }
}

pub fn journal_entry(username: &str, puzzle_id: PuzzleId, offset: Duration) -> NewJournalEntry {
    NewJournalEntry {
        username: username.into(),
        puzzle_id,
        success: false,
        time: Duration::from_secs(30),
        puzzle_rating_before: 1500.0,
        user_rating_after: 1450.0,
        difficulty: Difficulty::Normal,
        created_at: SystemTime::UNIX_EPOCH + offset,
    }
}
