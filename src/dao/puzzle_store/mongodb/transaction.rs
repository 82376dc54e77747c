//! Multi-document transaction backing [`StoreTransaction`] on MongoDB.
//!
//! Row locking is emulated by bumping a `revision` field on the user (and later the
//! puzzle) document as the first write of the transaction: any concurrent transaction
//! touching the same document then fails with a transient write conflict.

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession,
    bson::{Bson, doc},
    options::ReturnDocument,
};

use super::{
    error::{MongoDaoError, MongoResult},
    models::{
        JOURNAL_COUNTER_ID, MongoJournalDocument, doc_id, id_from_bson, id_to_bson, oldest_first,
    },
    store::Collections,
};
use crate::{
    dao::{
        models::{JournalEntryEntity, NewJournalEntry, PuzzleEntity, PuzzleId, UserEntity},
        puzzle_store::StoreTransaction,
        storage::{StorageError, StorageResult},
    },
    rating::Rating,
};

pub(super) struct MongoTransaction {
    session: ClientSession,
    collections: Collections,
    username: String,
    user: Option<UserEntity>,
}

impl MongoTransaction {
    pub(super) async fn start(
        client: &Client,
        collections: Collections,
        username: String,
    ) -> MongoResult<Self> {
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "open a session",
                source,
            })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "start a transaction",
                source,
            })?;

        let user = collections
            .users
            .find_one_and_update(doc! {"_id": &username}, doc! {"$inc": {"revision": 1_i64}})
            .return_document(ReturnDocument::After)
            .session(&mut session)
            .await
            .map_err(|source| MongoDaoError::LoadUser {
                username: username.clone(),
                source,
            })?
            .map(UserEntity::from);

        Ok(Self {
            session,
            collections,
            username,
            user,
        })
    }

    async fn lock_puzzle(&mut self, id: PuzzleId) -> MongoResult<Option<PuzzleEntity>> {
        let Ok(filter) = doc_id(id) else {
            return Ok(None);
        };
        let document = self
            .collections
            .puzzles
            .find_one_and_update(filter, doc! {"$inc": {"revision": 1_i64}})
            .return_document(ReturnDocument::After)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::LoadPuzzle { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn has_attempted(&mut self, puzzle_id: PuzzleId) -> MongoResult<bool> {
        let Ok(puzzle_id) = id_to_bson(puzzle_id) else {
            return Ok(false);
        };
        let count = self
            .collections
            .journal
            .count_documents(doc! {"user": &self.username, "puzzle_id": puzzle_id})
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::LoadJournal {
                username: self.username.clone(),
                source,
            })?;
        Ok(count > 0)
    }

    async fn journal_len(&mut self) -> MongoResult<usize> {
        let count = self
            .collections
            .journal
            .count_documents(doc! {"user": &self.username})
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::LoadJournal {
                username: self.username.clone(),
                source,
            })?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn save_user_rating(&mut self, rating: Rating) -> MongoResult<()> {
        self.collections
            .users
            .update_one(
                doc! {"_id": &self.username},
                doc! {"$set": {
                    "rating": rating.rating,
                    "rating_deviation": rating.deviation,
                    "volatility": rating.volatility,
                }},
            )
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::SaveUser {
                username: self.username.clone(),
                source,
            })?;

        if let Some(user) = self.user.as_mut() {
            user.rating = rating;
        }
        Ok(())
    }

    async fn save_puzzle_rating(
        &mut self,
        id: PuzzleId,
        rating: Rating,
        solved: bool,
    ) -> MongoResult<()> {
        let increment = if solved { 1_i64 } else { 0_i64 };
        let filter = doc_id(id)?;
        self.collections
            .puzzles
            .update_one(
                filter,
                doc! {
                    "$set": {
                        "rating": rating.rating,
                        "rating_deviation": rating.deviation,
                        "volatility": rating.volatility,
                    },
                    "$inc": {"solve_count": increment, "revision": 1_i64},
                },
            )
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::SavePuzzle { id, source })?;
        Ok(())
    }

    /// Journal ids come from a counter bumped outside the transaction, so appends of
    /// different users never contend on the counter document. Rolled-back appends
    /// leave gaps in the sequence.
    async fn next_journal_id(&self) -> MongoResult<i64> {
        let counter = self
            .collections
            .counters
            .find_one_and_update(
                doc! {"_id": JOURNAL_COUNTER_ID},
                doc! {"$inc": {"seq": 1_i64}},
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::AppendJournal {
                username: self.username.clone(),
                source,
            })?
            .ok_or_else(|| MongoDaoError::MissingDocument {
                what: "journal counter".into(),
            })?;
        Ok(counter.seq)
    }

    async fn append_journal(&mut self, entry: NewJournalEntry) -> MongoResult<JournalEntryEntity> {
        let id = self.next_journal_id().await?;
        let entity = JournalEntryEntity::from_new(id_from_bson(id), entry);
        let document = MongoJournalDocument::try_from(entity.clone())?;

        self.collections
            .journal
            .insert_one(&document)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::AppendJournal {
                username: self.username.clone(),
                source,
            })?;
        Ok(entity)
    }

    async fn evict_oldest_journal(&mut self, count: usize) -> MongoResult<usize> {
        if count == 0 {
            return Ok(0);
        }
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let oldest: Vec<MongoJournalDocument> = self
            .collections
            .journal
            .find(doc! {"user": &self.username})
            .sort(oldest_first())
            .limit(limit)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::EvictJournal {
                username: self.username.clone(),
                source,
            })?
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::EvictJournal {
                username: self.username.clone(),
                source,
            })?;

        let ids: Vec<Bson> = oldest.iter().map(|entry| Bson::Int64(entry.id)).collect();
        let result = self
            .collections
            .journal
            .delete_many(doc! {"_id": {"$in": ids}})
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::EvictJournal {
                username: self.username.clone(),
                source,
            })?;
        Ok(usize::try_from(result.deleted_count).unwrap_or(usize::MAX))
    }

    async fn commit(mut self) -> MongoResult<()> {
        self.session
            .commit_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "commit",
                source,
            })
    }
}

fn lift<T>(result: MongoResult<T>) -> StorageResult<T> {
    result.map_err(StorageError::from)
}

impl StoreTransaction for MongoTransaction {
    fn user(&mut self) -> BoxFuture<'_, StorageResult<Option<UserEntity>>> {
        Box::pin(async move { Ok(self.user.clone()) })
    }

    fn lock_puzzle(&mut self, id: PuzzleId) -> BoxFuture<'_, StorageResult<Option<PuzzleEntity>>> {
        Box::pin(async move { lift(MongoTransaction::lock_puzzle(self, id).await) })
    }

    fn has_attempted(&mut self, puzzle_id: PuzzleId) -> BoxFuture<'_, StorageResult<bool>> {
        Box::pin(async move { lift(MongoTransaction::has_attempted(self, puzzle_id).await) })
    }

    fn journal_len(&mut self) -> BoxFuture<'_, StorageResult<usize>> {
        Box::pin(async move { lift(MongoTransaction::journal_len(self).await) })
    }

    fn save_user_rating(&mut self, rating: Rating) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { lift(MongoTransaction::save_user_rating(self, rating).await) })
    }

    fn save_puzzle_rating(
        &mut self,
        id: PuzzleId,
        rating: Rating,
        solved: bool,
    ) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            lift(MongoTransaction::save_puzzle_rating(self, id, rating, solved).await)
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
            lift(MongoTransaction::append_journal(self, entry).await)
        })
    }

    fn evict_oldest_journal(&mut self, count: usize) -> BoxFuture<'_, StorageResult<usize>> {
        Box::pin(async move { lift(MongoTransaction::evict_oldest_journal(self, count).await) })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { lift(MongoTransaction::commit(*self).await) })
    }
}
