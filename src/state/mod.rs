use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::puzzle_store::PuzzleStore,
    error::ServiceError,
    rating::RatingEngine,
    services::matchmaking::{RandomSource, ThreadRandom},
};

/// Handle to the application state shared by every handler.
pub type SharedState = Arc<AppState>;

/// Currently installed puzzle store together with a short backend label.
#[derive(Clone)]
pub struct InstalledStore {
    pub store: Arc<dyn PuzzleStore>,
    pub backend: &'static str,
}

/// Central application state storing the store handle and the shared engines.
pub struct AppState {
    store: RwLock<Option<InstalledStore>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    engine: RatingEngine,
    random: Arc<dyn RandomSource>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_random(config, Arc::new(ThreadRandom))
    }

    /// Same as [`AppState::new`] with an explicit randomness source for puzzle selection.
    pub fn with_random(config: AppConfig, random: Arc<dyn RandomSource>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let engine = RatingEngine::new(config.rating.clone());
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            engine,
            random,
        })
    }

    /// Configuration loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Rating engine built from the configured settings.
    pub fn engine(&self) -> &RatingEngine {
        &self.engine
    }

    pub fn random(&self) -> Arc<dyn RandomSource> {
        self.random.clone()
    }

    /// Obtain a handle to the current puzzle store, if one is installed.
    pub async fn store(&self) -> Option<InstalledStore> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_store(&self) -> Result<Arc<dyn PuzzleStore>, ServiceError> {
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        self.store()
            .await
            .map(|installed| installed.store)
            .ok_or(ServiceError::Degraded)
    }

    /// Install a new puzzle store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn PuzzleStore>, backend: &'static str) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(InstalledStore { store, backend });
        }
        self.update_degraded(false);
    }

    /// Remove the current puzzle store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
