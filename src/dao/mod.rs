/// JSON catalog import.
pub mod catalog;
/// Database model definitions.
pub mod models;
/// Persistence port and its backends.
pub mod puzzle_store;
/// Storage abstraction layer for database operations.
pub mod storage;
