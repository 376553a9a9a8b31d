pub mod config;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;
pub mod stores;

pub use config::DatabaseConfig;
pub use memory::{MemoryAccountStore, MemoryTokenStore};
pub use pool::DatabasePool;
pub use stores::{PgAccountStore, PgTokenStore};

use thiserror::Error;
use tracker_core::TrackerError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::Migration(err.to_string())
    }
}

impl From<DatabaseError> for TrackerError {
    fn from(err: DatabaseError) -> Self {
        TrackerError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
