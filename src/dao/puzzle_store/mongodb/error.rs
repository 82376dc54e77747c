use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load user `{username}`")]
    LoadUser {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save user `{username}`")]
    SaveUser {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load puzzle `{id}`")]
    LoadPuzzle {
        id: u64,
        #[source]
        source: MongoError,
    },
    #[error("failed to save puzzle `{id}`")]
    SavePuzzle {
        id: u64,
        #[source]
        source: MongoError,
    },
    #[error("failed to list puzzles")]
    ListPuzzles {
        #[source]
        source: MongoError,
    },
    #[error("failed to load journal of `{username}`")]
    LoadJournal {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to append journal entry for `{username}`")]
    AppendJournal {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to evict journal entries of `{username}`")]
    EvictJournal {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("transaction failed while trying to {stage}")]
    Transaction {
        stage: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB deployment is a standalone server; transactions need a replica set")]
    TransactionsUnsupported,
    #[error("id {id} does not fit a BSON int64")]
    IdOutOfRange { id: u64 },
    #[error("MongoDB returned no document for {what}")]
    MissingDocument { what: String },
}
