//! SQLite-backed store shared by every record table.
//!
//! # Responsibility
//! - Map one entity type to one table through [`SqlRecord`].
//! - Keep SQL text generation inside the store boundary.
//!
//! # Invariants
//! - Keys `<= 0` are unassigned; inserts let SQLite allocate them.
//! - `apply_batch` runs inside one transaction.

use super::{Store, StoreError, StoreResult, StoreWrite};
use crate::repo::Entity;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// One connection shared by all stores of a library.
pub type SharedConnection = Arc<Mutex<Connection>>;

pub fn shared_connection(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Table mapping for an integer-keyed entity.
pub trait SqlRecord: Entity<Key = i64> {
    const TABLE: &'static str;
    /// Data columns, excluding `id`, in `to_values` order.
    const COLUMNS: &'static [&'static str];

    fn to_values(&self) -> StoreResult<Vec<Value>>;

    /// Builds an entity from a row selected as `id, COLUMNS...`.
    fn from_row(row: &Row<'_>) -> StoreResult<Self>;
}

/// Generic [`Store`] over one SQLite table.
pub struct SqliteStore<T: SqlRecord> {
    conn: SharedConnection,
    _record: PhantomData<fn() -> T>,
}

impl<T: SqlRecord> SqliteStore<T> {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            _record: PhantomData,
        }
    }
}

impl<T: SqlRecord> Store<T> for SqliteStore<T> {
    fn load_all(&self) -> StoreResult<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC;", select_sql::<T>()))?;
        let mut rows = stmt.query([])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(T::from_row(row)?);
        }
        Ok(entities)
    }

    fn load(&self, key: &i64) -> StoreResult<Option<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1;", select_sql::<T>()))?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(T::from_row(row)?));
        }
        Ok(None)
    }

    fn insert(&self, entity: &T) -> StoreResult<i64> {
        let conn = self.conn.lock();
        insert_row(&conn, entity)
    }

    fn update(&self, entity: &T) -> StoreResult<()> {
        let conn = self.conn.lock();
        update_row(&conn, entity)
    }

    fn delete(&self, key: &i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        delete_row::<T>(&conn, *key)
    }

    fn apply_batch(&self, writes: &[StoreWrite<'_, T>]) -> StoreResult<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut keys = Vec::with_capacity(writes.len());
        for write in writes {
            let key = match write {
                StoreWrite::Insert(entity) => insert_row(&tx, *entity)?,
                StoreWrite::Update(entity) => {
                    update_row(&tx, *entity)?;
                    entity.key()
                }
                StoreWrite::Delete(key) => {
                    delete_row::<T>(&tx, *key)?;
                    *key
                }
            };
            keys.push(key);
        }
        tx.commit()?;
        Ok(keys)
    }
}

fn select_sql<T: SqlRecord>() -> String {
    format!("SELECT id, {} FROM {}", T::COLUMNS.join(", "), T::TABLE)
}

fn insert_row<T: SqlRecord>(conn: &Connection, entity: &T) -> StoreResult<i64> {
    let mut values = entity.to_values()?;
    let mut columns: Vec<&str> = T::COLUMNS.to_vec();
    if entity.key() > 0 {
        columns.insert(0, "id");
        values.insert(0, Value::Integer(entity.key()));
    }
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        T::TABLE,
        columns.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))
        .map_err(|err| match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(message.unwrap_or_else(|| {
                    format!("duplicate key {} in `{}`", entity.key(), T::TABLE)
                }))
            }
            other => other.into(),
        })?;
    Ok(conn.last_insert_rowid())
}

fn update_row<T: SqlRecord>(conn: &Connection, entity: &T) -> StoreResult<()> {
    let mut values = entity.to_values()?;
    let assignments = T::COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    values.push(Value::Integer(entity.key()));
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE id = ?{};",
        T::TABLE,
        values.len()
    );
    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(StoreError::MissingRow {
            table: T::TABLE,
            key: entity.key().to_string(),
        });
    }
    Ok(())
}

fn delete_row<T: SqlRecord>(conn: &Connection, key: i64) -> StoreResult<()> {
    conn.execute(&format!("DELETE FROM {} WHERE id = ?1;", T::TABLE), [key])?;
    Ok(())
}

pub(crate) fn json_value<V: Serialize>(value: &V) -> StoreResult<Value> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode column: {err}")))
}

pub(crate) fn json_column<V: DeserializeOwned>(
    row: &Row<'_>,
    table: &str,
    column: &str,
) -> StoreResult<V> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|err| {
        StoreError::InvalidData(format!("invalid JSON in {table}.{column}: {err}"))
    })
}

pub(crate) fn bool_column(row: &Row<'_>, table: &str, column: &str) -> StoreResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn bool_value(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub(crate) fn optional_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
