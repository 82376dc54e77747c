//! In-process store used for development and tests.
//!
//! Rows are serialized with per-user and per-puzzle async mutexes; a transaction
//! buffers its writes and applies them under the data write lock on commit.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{PuzzleStore, RatingWindow, StoreTransaction};
use crate::{
    dao::{
        models::{
            JournalEntryEntity, JournalId, NewJournalEntry, PuzzleEntity, PuzzleId, UserEntity,
        },
        storage::{StorageError, StorageResult},
    },
    rating::Rating,
};

/// Puzzle store kept entirely in process memory.
#[derive(Clone, Default)]
pub struct MemoryPuzzleStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    data: RwLock<MemoryData>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    puzzle_locks: DashMap<PuzzleId, Arc<Mutex<()>>>,
    next_journal_id: AtomicU64,
}

#[derive(Default)]
struct MemoryData {
    users: HashMap<String, UserEntity>,
    puzzles: IndexMap<PuzzleId, PuzzleEntity>,
    journal: BTreeMap<JournalId, JournalEntryEntity>,
}

impl MemoryData {
    fn journal_for<'a>(
        &'a self,
        username: &'a str,
    ) -> impl Iterator<Item = &'a JournalEntryEntity> + 'a {
        self.journal
            .values()
            .filter(move |entry| entry.username == username)
    }
}

impl MemoryInner {
    fn user_lock(&self, username: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(username.to_owned())
            .or_default()
            .clone()
    }

    fn puzzle_lock(&self, id: PuzzleId) -> Arc<Mutex<()>> {
        self.puzzle_locks.entry(id).or_default().clone()
    }

    /// Drop registry entries nobody holds or waits on.
    fn prune_locks(&self, username: &str, puzzles: impl IntoIterator<Item = PuzzleId>) {
        self.user_locks
            .remove_if(username, |_, lock| Arc::strong_count(lock) == 1);
        for id in puzzles {
            self.puzzle_locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

impl MemoryPuzzleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create_user(&self, username: String, defaults: Rating) -> UserEntity {
        let mut data = self.inner.data.write().await;
        data.users
            .entry(username.clone())
            .or_insert_with(|| UserEntity::new(username, defaults))
            .clone()
    }

    async fn unseen_puzzles(
        &self,
        username: String,
        window: Option<RatingWindow>,
    ) -> Vec<PuzzleEntity> {
        let data = self.inner.data.read().await;
        let seen: HashSet<PuzzleId> = data
            .journal_for(&username)
            .map(|entry| entry.puzzle_id)
            .collect();

        data.puzzles
            .values()
            .filter(|puzzle| !seen.contains(&puzzle.id))
            .filter(|puzzle| window.is_none_or(|window| window.contains(puzzle.rating.rating)))
            .cloned()
            .collect()
    }

    async fn list_journal_for_user(&self, username: String) -> Vec<JournalEntryEntity> {
        let data = self.inner.data.read().await;
        let mut entries: Vec<_> = data.journal_for(&username).cloned().collect();
        sort_oldest_first(&mut entries);
        entries
    }

    async fn insert_puzzles(&self, puzzles: Vec<PuzzleEntity>) -> usize {
        let mut data = self.inner.data.write().await;
        let mut inserted = 0;
        for puzzle in puzzles {
            if let indexmap::map::Entry::Vacant(slot) = data.puzzles.entry(puzzle.id) {
                slot.insert(puzzle);
                inserted += 1;
            }
        }
        data.puzzles.sort_keys();
        inserted
    }
}

impl PuzzleStore for MemoryPuzzleStore {
    fn get_or_create_user(
        &self,
        username: &str,
        defaults: Rating,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move { Ok(store.get_or_create_user(username, defaults).await) })
    }

    fn find_user(&self, username: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move {
            let data = store.inner.data.read().await;
            Ok(data.users.get(&username).cloned())
        })
    }

    fn find_puzzle(&self, id: PuzzleId) -> BoxFuture<'static, StorageResult<Option<PuzzleEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.inner.data.read().await;
            Ok(data.puzzles.get(&id).cloned())
        })
    }

    fn unseen_puzzles(
        &self,
        username: &str,
        window: Option<RatingWindow>,
    ) -> BoxFuture<'static, StorageResult<Vec<PuzzleEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move { Ok(store.unseen_puzzles(username, window).await) })
    }

    fn list_journal_for_user(
        &self,
        username: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<JournalEntryEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move { Ok(store.list_journal_for_user(username).await) })
    }

    fn insert_puzzles(&self, puzzles: Vec<PuzzleEntity>) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert_puzzles(puzzles).await) })
    }

    fn begin(&self, username: &str) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>> {
        let inner = self.inner.clone();
        let username = username.to_owned();
        Box::pin(async move {
            let user_guard = inner.user_lock(&username).lock_owned().await;
            let transaction: Box<dyn StoreTransaction> = Box::new(MemoryTransaction {
                inner,
                username,
                user_guard: Some(user_guard),
                puzzle_guards: HashMap::new(),
                writes: Vec::new(),
            });
            Ok(transaction)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

enum PendingWrite {
    UserRating(Rating),
    PuzzleRating {
        id: PuzzleId,
        rating: Rating,
        solved: bool,
    },
    Journal(JournalEntryEntity),
    Evict(Vec<JournalId>),
}

struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    username: String,
    user_guard: Option<OwnedMutexGuard<()>>,
    puzzle_guards: HashMap<PuzzleId, OwnedMutexGuard<()>>,
    writes: Vec<PendingWrite>,
}

impl MemoryTransaction {
    async fn acquire_puzzle(&mut self, id: PuzzleId) {
        if !self.puzzle_guards.contains_key(&id) {
            let guard = self.inner.puzzle_lock(id).lock_owned().await;
            self.puzzle_guards.insert(id, guard);
        }
    }

    /// Journal of the bound user as this transaction sees it, oldest first.
    async fn visible_journal(&self) -> Vec<JournalEntryEntity> {
        let evicted: HashSet<JournalId> = self
            .writes
            .iter()
            .filter_map(|write| match write {
                PendingWrite::Evict(ids) => Some(ids.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();

        let data = self.inner.data.read().await;
        let mut entries: Vec<_> = data.journal_for(&self.username).cloned().collect();
        drop(data);

        entries.extend(self.writes.iter().filter_map(|write| match write {
            PendingWrite::Journal(entry) => Some(entry.clone()),
            _ => None,
        }));
        entries.retain(|entry| !evicted.contains(&entry.id));
        sort_oldest_first(&mut entries);
        entries
    }

    async fn apply(&mut self) -> StorageResult<()> {
        let mut data = self.inner.data.write().await;
        for write in std::mem::take(&mut self.writes) {
            match write {
                PendingWrite::UserRating(rating) => {
                    let user = data.users.get_mut(&self.username).ok_or_else(|| {
                        StorageError::conflict(format!("user `{}` vanished", self.username))
                    })?;
                    user.rating = rating;
                }
                PendingWrite::PuzzleRating { id, rating, solved } => {
                    let puzzle = data.puzzles.get_mut(&id).ok_or_else(|| {
                        StorageError::conflict(format!("puzzle `{id}` vanished"))
                    })?;
                    puzzle.rating = rating;
                    if solved {
                        puzzle.solve_count += 1;
                    }
                }
                PendingWrite::Journal(entry) => {
                    data.journal.insert(entry.id, entry);
                }
                PendingWrite::Evict(ids) => {
                    for id in ids {
                        data.journal.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    fn user(&mut self) -> BoxFuture<'_, StorageResult<Option<UserEntity>>> {
        Box::pin(async move {
            let data = self.inner.data.read().await;
            let mut user = data.users.get(&self.username).cloned();
            drop(data);

            if let Some(user) = user.as_mut() {
                for write in &self.writes {
                    if let PendingWrite::UserRating(rating) = write {
                        user.rating = *rating;
                    }
                }
            }
            Ok(user)
        })
    }

    fn lock_puzzle(&mut self, id: PuzzleId) -> BoxFuture<'_, StorageResult<Option<PuzzleEntity>>> {
        Box::pin(async move {
            self.acquire_puzzle(id).await;
            let data = self.inner.data.read().await;
            let mut puzzle = data.puzzles.get(&id).cloned();
            drop(data);

            if let Some(puzzle) = puzzle.as_mut() {
                for write in &self.writes {
                    match write {
                        PendingWrite::PuzzleRating {
                            id: pending,
                            rating,
                            solved,
                        } if *pending == id => {
                            puzzle.rating = *rating;
                            if *solved {
                                puzzle.solve_count += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(puzzle)
        })
    }

    fn has_attempted(&mut self, puzzle_id: PuzzleId) -> BoxFuture<'_, StorageResult<bool>> {
        Box::pin(async move {
            Ok(self
                .visible_journal()
                .await
                .iter()
                .any(|entry| entry.puzzle_id == puzzle_id))
        })
    }

    fn journal_len(&mut self) -> BoxFuture<'_, StorageResult<usize>> {
        Box::pin(async move { Ok(self.visible_journal().await.len()) })
    }

    fn save_user_rating(&mut self, rating: Rating) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.writes.push(PendingWrite::UserRating(rating));
            Ok(())
        })
    }

    fn save_puzzle_rating(
        &mut self,
        id: PuzzleId,
        rating: Rating,
        solved: bool,
    ) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.acquire_puzzle(id).await;
            self.writes
                .push(PendingWrite::PuzzleRating { id, rating, solved });
            Ok(())
        })
    }

    fn append_journal(
        &mut self,
        entry: NewJournalEntry,
    ) -> BoxFuture<'_, StorageResult<JournalEntryEntity>> {
        Box::pin(async move {
            if entry.username != self.username {
                return Err(StorageError::invalid_entry(format!(
                    "journal entry for `{}` appended in a transaction bound to `{}`",
                    entry.username, self.username
                )));
            }
            let id = self.inner.next_journal_id.fetch_add(1, Ordering::Relaxed) + 1;
            let entry = JournalEntryEntity::from_new(id, entry);
            self.writes.push(PendingWrite::Journal(entry.clone()));
            Ok(entry)
        })
    }

    fn evict_oldest_journal(&mut self, count: usize) -> BoxFuture<'_, StorageResult<usize>> {
        Box::pin(async move {
            let ids: Vec<JournalId> = self
                .visible_journal()
                .await
                .into_iter()
                .take(count)
                .map(|entry| entry.id)
                .collect();
            let evicted = ids.len();
            self.writes.push(PendingWrite::Evict(ids));
            Ok(evicted)
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            let mut transaction = self;
            transaction.apply().await
        })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.user_guard.take();
        let puzzles: Vec<PuzzleId> = self.puzzle_guards.drain().map(|(id, _)| id).collect();
        self.inner.prune_locks(&self.username, puzzles);
    }
}

fn sort_oldest_first(entries: &mut [JournalEntryEntity]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::{Difficulty, Side};

    fn puzzle(id: PuzzleId, rating: f64) -> PuzzleEntity {
        PuzzleEntity {
            id,
            fen1: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".into(),
            move1: "e2e4".into(),
            fen2: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".into(),
            move2: "e7e5".into(),
            solution: true,
            color: Side::White,
            type_id: 1,
            rating: Rating::new(rating, 350.0, 0.06),
            solve_count: 0,
        }
    }

    fn entry(username: &str, puzzle_id: PuzzleId, offset_secs: u64) -> NewJournalEntry {
        NewJournalEntry {
            username: username.into(),
            puzzle_id,
            success: true,
            time: Duration::from_secs(12),
            puzzle_rating_before: 1500.0,
            user_rating_after: 1520.0,
            difficulty: Difficulty::Normal,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(offset_secs),
        }
    }

    async fn seeded() -> MemoryPuzzleStore {
        let store = MemoryPuzzleStore::new();
        PuzzleStore::insert_puzzles(
            &store,
            vec![puzzle(3, 2100.0), puzzle(1, 1500.0), puzzle(2, 1650.0)],
        )
        .await
        .unwrap();
        store
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = MemoryPuzzleStore::new();
        let defaults = Rating::new(1500.0, 350.0, 0.06);
        let created = PuzzleStore::get_or_create_user(&store, "alice", defaults)
            .await
            .unwrap();
        assert!(created.active);
        assert_eq!(created.rating, defaults);

        let other_defaults = Rating::new(1000.0, 100.0, 0.05);
        let again = PuzzleStore::get_or_create_user(&store, "alice", other_defaults)
            .await
            .unwrap();
        assert_eq!(again.rating, defaults);
    }

    #[tokio::test]
    async fn unseen_puzzles_filters_journal_and_window() {
        let store = seeded().await;
        PuzzleStore::get_or_create_user(&store, "bob", Rating::new(1500.0, 350.0, 0.06))
            .await
            .unwrap();

        let mut tx = store.begin("bob").await.unwrap();
        tx.append_journal(entry("bob", 1, 10)).await.unwrap();
        tx.commit().await.unwrap();

        let all = PuzzleStore::unseen_puzzles(&store, "bob", None).await.unwrap();
        assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);

        let near = PuzzleStore::unseen_puzzles(
            &store,
            "bob",
            Some(RatingWindow::around(1500.0, 300.0)),
        )
        .await
        .unwrap();
        assert_eq!(near.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = seeded().await;
        let defaults = Rating::new(1500.0, 350.0, 0.06);
        PuzzleStore::get_or_create_user(&store, "carol", defaults)
            .await
            .unwrap();

        {
            let mut tx = store.begin("carol").await.unwrap();
            tx.save_user_rating(Rating::new(1600.0, 300.0, 0.06))
                .await
                .unwrap();
            tx.append_journal(entry("carol", 2, 5)).await.unwrap();
        }

        let user = PuzzleStore::find_user(&store, "carol").await.unwrap().unwrap();
        assert_eq!(user.rating, defaults);
        assert!(
            PuzzleStore::list_journal_for_user(&store, "carol")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn commit_applies_ratings_and_solve_count() {
        let store = seeded().await;
        PuzzleStore::get_or_create_user(&store, "dave", Rating::new(1500.0, 350.0, 0.06))
            .await
            .unwrap();

        let mut tx = store.begin("dave").await.unwrap();
        tx.lock_puzzle(2).await.unwrap().unwrap();
        tx.save_user_rating(Rating::new(1580.0, 290.0, 0.06))
            .await
            .unwrap();
        tx.save_puzzle_rating(2, Rating::new(1570.0, 290.0, 0.06), true)
            .await
            .unwrap();
        assert!(!tx.has_attempted(2).await.unwrap());
        tx.append_journal(entry("dave", 2, 1)).await.unwrap();
        assert!(tx.has_attempted(2).await.unwrap());
        tx.commit().await.unwrap();

        let user = PuzzleStore::find_user(&store, "dave").await.unwrap().unwrap();
        assert_eq!(user.rating.rating, 1580.0);
        let puzzle = PuzzleStore::find_puzzle(&store, 2).await.unwrap().unwrap();
        assert_eq!(puzzle.rating.rating, 1570.0);
        assert_eq!(puzzle.solve_count, 1);
    }

    #[tokio::test]
    async fn eviction_removes_oldest_entries() {
        let store = seeded().await;
        let mut tx = store.begin("erin").await.unwrap();
        tx.append_journal(entry("erin", 3, 30)).await.unwrap();
        tx.append_journal(entry("erin", 1, 10)).await.unwrap();
        tx.append_journal(entry("erin", 2, 20)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin("erin").await.unwrap();
        assert_eq!(tx.journal_len().await.unwrap(), 3);
        assert_eq!(tx.evict_oldest_journal(1).await.unwrap(), 1);
        assert_eq!(tx.journal_len().await.unwrap(), 2);
        tx.commit().await.unwrap();

        let remaining: Vec<_> = PuzzleStore::list_journal_for_user(&store, "erin")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.puzzle_id)
            .collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[tokio::test]
    async fn transactions_for_same_user_are_serialized() {
        let store = seeded().await;
        let first = store.begin("frank").await.unwrap();

        let contender = store.clone();
        let waiting = tokio::spawn(async move { contender.begin("frank").await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn finished_transactions_release_their_lock_entries() {
        let store = seeded().await;

        let mut tx = store.begin("grace").await.unwrap();
        tx.lock_puzzle(1).await.unwrap().unwrap();
        tx.save_puzzle_rating(2, Rating::new(1600.0, 300.0, 0.06), false)
            .await
            .unwrap();
        assert_eq!(store.inner.user_locks.len(), 1);
        assert_eq!(store.inner.puzzle_locks.len(), 2);
        tx.commit().await.unwrap();
        assert!(store.inner.user_locks.is_empty());
        assert!(store.inner.puzzle_locks.is_empty());

        for username in ["heidi", "ivan", "judy"] {
            let mut tx = store.begin(username).await.unwrap();
            tx.lock_puzzle(3).await.unwrap().unwrap();
        }
        assert!(store.inner.user_locks.is_empty());
        assert!(store.inner.puzzle_locks.is_empty());
    }

    #[tokio::test]
    async fn waiting_transaction_keeps_the_shared_lock() {
        let store = seeded().await;
        let first = store.begin("kim").await.unwrap();

        let contender = store.clone();
        let waiting = tokio::spawn(async move {
            let tx = contender.begin("kim").await?;
            tx.commit().await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(store.inner.user_locks.len(), 1);
        waiting.await.unwrap().unwrap();
        assert!(store.inner.user_locks.is_empty());
    }
}
