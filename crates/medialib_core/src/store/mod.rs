//! Durable store contract and adapters.
//!
//! # Responsibility
//! - Define the per-entity persistence contract the repository layer writes
//!   through.
//! - Provide a SQLite adapter and an in-memory adapter.
//!
//! # Invariants
//! - Every call either fully succeeds or reports an error; a failed
//!   `apply_batch` leaves the store unchanged.

use crate::db::DbError;
use crate::repo::Entity;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod records;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{shared_connection, SharedConnection, SqlRecord, SqliteStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Persisted row cannot be mapped to a valid entity.
    InvalidData(String),
    /// Update targeted a row that does not exist.
    MissingRow { table: &'static str, key: String },
    /// Insert collided with an existing primary key.
    Constraint(String),
    /// Backend refused the call (offline, injected failure).
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRow { table, key } => write!(f, "no row {key} in `{table}`"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One staged write inside an atomic batch.
#[derive(Debug)]
pub enum StoreWrite<'a, T: Entity> {
    Insert(&'a T),
    Update(&'a T),
    Delete(T::Key),
}

/// Persistence contract for one entity type.
pub trait Store<T: Entity>: Send + Sync {
    fn load_all(&self) -> StoreResult<Vec<T>>;

    fn load(&self, key: &T::Key) -> StoreResult<Option<T>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|entity| entity.key() == *key))
    }

    /// Inserts one entity and returns its (possibly generated) key.
    fn insert(&self, entity: &T) -> StoreResult<T::Key>;

    fn update(&self, entity: &T) -> StoreResult<()>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &T::Key) -> StoreResult<()>;

    /// Applies all writes atomically and returns one key per write, in order.
    fn apply_batch(&self, writes: &[StoreWrite<'_, T>]) -> StoreResult<Vec<T::Key>>;
}
