//! Persistence ports and their adapters.

pub mod memory;
pub mod ports;
pub mod postgres;

use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// A uniqueness or serialization conflict with a concurrent writer.
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("internal store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some(UNIQUE_VIOLATION) | Some(SERIALIZATION_FAILURE) => StoreError::Conflict(
                        db_err
                            .constraint()
                            .map(str::to_string)
                            .unwrap_or_else(|| db_err.message().to_string()),
                    ),
                    _ => StoreError::Database(sqlx::Error::Database(db_err)),
                }
            }
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
