use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, doc},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::{PingRetry, establish_connection},
    error::{MongoDaoError, MongoResult},
    models::{
        COUNTER_COLLECTION_NAME, JOURNAL_COLLECTION_NAME, MongoCounterDocument,
        MongoJournalDocument, MongoPuzzleDocument, MongoUserDocument, PUZZLE_COLLECTION_NAME,
        USER_COLLECTION_NAME, doc_id, oldest_first,
    },
    transaction::MongoTransaction,
};
use crate::{
    dao::{
        models::{JournalEntryEntity, PuzzleEntity, PuzzleId, UserEntity},
        puzzle_store::{PuzzleStore, RatingWindow, StoreTransaction},
        storage::StorageResult,
    },
    rating::Rating,
};

/// MongoDB-backed puzzle store. Attempts run in multi-document transactions, so the
/// deployment must be a replica set.
#[derive(Clone)]
pub struct MongoPuzzleStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

/// Typed handles on every collection the store touches.
#[derive(Clone)]
pub(super) struct Collections {
    pub users: Collection<MongoUserDocument>,
    pub puzzles: Collection<MongoPuzzleDocument>,
    pub journal: Collection<MongoJournalDocument>,
    pub counters: Collection<MongoCounterDocument>,
}

impl Collections {
    fn new(database: &Database) -> Self {
        Self {
            users: database.collection(USER_COLLECTION_NAME),
            puzzles: database.collection(PUZZLE_COLLECTION_NAME),
            journal: database.collection(JOURNAL_COLLECTION_NAME),
            counters: database.collection(COUNTER_COLLECTION_NAME),
        }
    }
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.config.options,
            &self.config.database_name,
            PingRetry::RECONNECT,
        )
        .await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoPuzzleStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name, PingRetry::STARTUP)
                .await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collections = self.collections().await;

        let attempt_index = IndexModel::builder()
            .keys(doc! {"user": 1, "puzzle_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("journal_user_puzzle_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        collections
            .journal
            .create_index(attempt_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: JOURNAL_COLLECTION_NAME,
                index: "user,puzzle_id",
                source,
            })?;

        let history_index = IndexModel::builder()
            .keys(doc! {"user": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("journal_user_created_idx".to_owned()))
                    .build(),
            )
            .build();
        collections
            .journal
            .create_index(history_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: JOURNAL_COLLECTION_NAME,
                index: "user,created_at",
                source,
            })?;

        let rating_index = IndexModel::builder()
            .keys(doc! {"rating": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("puzzle_rating_idx".to_owned()))
                    .build(),
            )
            .build();
        collections
            .puzzles
            .create_index(rating_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PUZZLE_COLLECTION_NAME,
                index: "rating",
                source,
            })?;

        Ok(())
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn collections(&self) -> Collections {
        let guard = self.inner.state.read().await;
        Collections::new(&guard.database)
    }

    async fn get_or_create_user(
        &self,
        username: String,
        defaults: Rating,
    ) -> MongoResult<UserEntity> {
        let collections = self.collections().await;
        let document = collections
            .users
            .find_one_and_update(
                doc! {"_id": &username},
                doc! {"$setOnInsert": {
                    "rating": defaults.rating,
                    "rating_deviation": defaults.deviation,
                    "volatility": defaults.volatility,
                    "active": true,
                    "revision": 0_i64,
                }},
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveUser {
                username: username.clone(),
                source,
            })?
            .ok_or_else(|| MongoDaoError::MissingDocument {
                what: format!("user `{username}` after upsert"),
            })?;

        Ok(document.into())
    }

    async fn find_user(&self, username: String) -> MongoResult<Option<UserEntity>> {
        let collections = self.collections().await;
        let document = collections
            .users
            .find_one(doc! {"_id": &username})
            .await
            .map_err(|source| MongoDaoError::LoadUser { username, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_puzzle(&self, id: PuzzleId) -> MongoResult<Option<PuzzleEntity>> {
        let Ok(filter) = doc_id(id) else {
            return Ok(None);
        };
        let collections = self.collections().await;
        let document = collections
            .puzzles
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::LoadPuzzle { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn unseen_puzzles(
        &self,
        username: String,
        window: Option<RatingWindow>,
    ) -> MongoResult<Vec<PuzzleEntity>> {
        let collections = self.collections().await;
        let mut session = self
            .client()
            .await
            .start_session()
            .snapshot(true)
            .await
            .map_err(|source| MongoDaoError::ListPuzzles { source })?;

        let seen: Vec<Bson> = collections
            .journal
            .distinct("puzzle_id", doc! {"user": &username})
            .session(&mut session)
            .await
            .map_err(|source| MongoDaoError::LoadJournal {
                username: username.clone(),
                source,
            })?;

        let mut filter = doc! {"_id": {"$nin": seen}};
        if let Some(window) = window {
            filter.insert("rating", doc! {"$gte": window.min, "$lte": window.max});
        }

        let documents: Vec<MongoPuzzleDocument> = collections
            .puzzles
            .find(filter)
            .sort(doc! {"_id": 1})
            .session(&mut session)
            .await
            .map_err(|source| MongoDaoError::ListPuzzles { source })?
            .stream(&mut session)
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPuzzles { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn list_journal_for_user(&self, username: String) -> MongoResult<Vec<JournalEntryEntity>> {
        let collections = self.collections().await;
        let documents: Vec<MongoJournalDocument> = collections
            .journal
            .find(doc! {"user": &username})
            .sort(oldest_first())
            .await
            .map_err(|source| MongoDaoError::LoadJournal {
                username: username.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadJournal { username, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn insert_puzzles(&self, puzzles: Vec<PuzzleEntity>) -> MongoResult<usize> {
        let collections = self.collections().await;
        let mut inserted = 0;
        for puzzle in puzzles {
            let id = puzzle.id;
            let document = MongoPuzzleDocument::try_from(puzzle)?;
            match collections.puzzles.insert_one(&document).await {
                Ok(_) => inserted += 1,
                Err(source) if is_duplicate_key(&source) => {}
                Err(source) => return Err(MongoDaoError::SavePuzzle { id, source }),
            }
        }
        Ok(inserted)
    }

    async fn begin(&self, username: String) -> MongoResult<MongoTransaction> {
        let client = self.client().await;
        let collections = self.collections().await;
        MongoTransaction::start(&client, collections, username).await
    }
}

impl PuzzleStore for MongoPuzzleStore {
    fn get_or_create_user(
        &self,
        username: &str,
        defaults: Rating,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move {
            store
                .get_or_create_user(username, defaults)
                .await
                .map_err(Into::into)
        })
    }

    fn find_user(&self, username: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move { store.find_user(username).await.map_err(Into::into) })
    }

    fn find_puzzle(&self, id: PuzzleId) -> BoxFuture<'static, StorageResult<Option<PuzzleEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_puzzle(id).await.map_err(Into::into) })
    }

    fn unseen_puzzles(
        &self,
        username: &str,
        window: Option<RatingWindow>,
    ) -> BoxFuture<'static, StorageResult<Vec<PuzzleEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move {
            store
                .unseen_puzzles(username, window)
                .await
                .map_err(Into::into)
        })
    }

    fn list_journal_for_user(
        &self,
        username: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<JournalEntryEntity>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move { store.list_journal_for_user(username).await.map_err(Into::into) })
    }

    fn insert_puzzles(&self, puzzles: Vec<PuzzleEntity>) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.insert_puzzles(puzzles).await.map_err(Into::into) })
    }

    fn begin(&self, username: &str) -> BoxFuture<'static, StorageResult<Box<dyn StoreTransaction>>> {
        let store = self.clone();
        let username = username.to_owned();
        Box::pin(async move {
            let transaction = store.begin(username).await?;
            let transaction: Box<dyn StoreTransaction> = Box::new(transaction);
            Ok(transaction)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(failure)) if failure.code == DUPLICATE_KEY
    )
}
