mod config;
mod connection;
mod error;
mod models;
pub mod store;
mod transaction;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoPuzzleStore;

use std::error::Error as _;

use mongodb::error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR};

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if let MongoDaoError::IdOutOfRange { .. } = err {
            return StorageError::invalid_entry(err.to_string());
        }
        let transient = err
            .source()
            .and_then(|source| source.downcast_ref::<MongoError>())
            .is_some_and(|source| source.contains_label(TRANSIENT_TRANSACTION_ERROR));

        if transient {
            StorageError::conflict(err.to_string())
        } else {
            StorageError::unavailable(err.to_string(), err)
        }
    }
}
