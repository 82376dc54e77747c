use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{puzzle_store::PuzzleStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the puzzle store, then keep polling its health, reconnecting when it fails and
/// keeping the shared state in degraded mode while it is unavailable.
pub async fn run<F, Fut>(state: SharedState, backend: &'static str, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PuzzleStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone(), backend).await;
                info!(backend, "storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise(&state, store.as_ref()).await;

                state.clear_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(backend, error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll `store` until it fails and cannot be reconnected.
async fn supervise(state: &SharedState, store: &dyn PuzzleStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if reconnect(state, store).await {
                    state.update_degraded(false);
                    sleep(HEALTH_POLL_INTERVAL).await;
                } else {
                    warn!("exhausted storage reconnect attempts; staying in degraded mode");
                    return;
                }
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn PuzzleStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(reconnect_err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %reconnect_err,
                        "storage reconnect first attempt failed; entering in degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            catalog::seed_store,
            models::{JournalEntryEntity, PuzzleEntity, PuzzleId, UserEntity},
            puzzle_store::{RatingWindow, StoreTransaction, memory::MemoryPuzzleStore},
            storage::StorageResult,
        },
        rating::Rating,
        services::test_support::puzzle,
        state::AppState,
    };

    /// Store whose every call fails as if the database were down.
    struct Unreachable;

    fn down<T: Send + 'static>() -> BoxFuture<'static, StorageResult<T>> {
        Box::pin(async {
            Err(StorageError::unavailable(
                "database down".into(),
                std::io::Error::other("connection refused"),
            ))
        })
    }

    impl PuzzleStore for Unreachable {
        fn get_or_create_user(
            &self,
            _: &str,
            _: Rating,
        ) -> BoxFuture<'static, StorageResult<UserEntity>> {
            down()
        }
        fn find_user(&self, _: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
            down()
        }
        fn find_puzzle(
            &self,
            _: PuzzleId,
        ) -> BoxFuture<'static, StorageResult<Option<PuzzleEntity>>> {
            down()
        }
        fn unseen_puzzles(
            &self,
            _: &str,
            _: Option<RatingWindow>,
        ) -> BoxFuture<'static, StorageResult<Vec<PuzzleEntity>>> {
            down()
        }
        fn list_journal_for_user(
            &self,
            _: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<JournalEntryEntity>>> {
            down()
        }
        fn insert_puzzles(&self, _: Vec<PuzzleEntity>) -> BoxFuture<'static, StorageResult<usize>> {
            down()
        }
        fn begin(&self, _: &str) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>> {
            down()
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            down()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            down()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_backend_connects() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let task = tokio::spawn(run(state.clone(), "memory", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::unavailable(
                        "not yet".into(),
                        std::io::Error::other("connection refused"),
                    ))
                } else {
                    let store: Arc<dyn PuzzleStore> = Arc::new(MemoryPuzzleStore::new());
                    Ok(store)
                }
            }
        }));

        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(state.store().await.map(|s| s.backend), Some("memory"));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_health_check_enters_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();

        let task = tokio::spawn(run(state.clone(), "test", || async {
            let store: Arc<dyn PuzzleStore> = Arc::new(Unreachable);
            Ok(store)
        }));

        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow_and_update());
        watcher.changed().await.unwrap();
        assert!(*watcher.borrow_and_update());
        assert!(state.require_store().await.is_err());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn connected_store_is_seeded_before_install() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        let catalog = vec![puzzle(1, 1500.0), puzzle(2, 1700.0)];

        let task = tokio::spawn(run(state.clone(), "memory", move || {
            let catalog = catalog.clone();
            async move {
                let store: Arc<dyn PuzzleStore> = Arc::new(MemoryPuzzleStore::new());
                seed_store(store.as_ref(), catalog).await?;
                Ok(store)
            }
        }));

        watcher.changed().await.unwrap();
        let store = state.require_store().await.unwrap();
        assert!(store.find_puzzle(2).await.unwrap().is_some());
        task.abort();
    }
}
