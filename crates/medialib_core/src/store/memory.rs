//! In-memory store for tests, demos and embedders without SQLite.

use super::{Store, StoreError, StoreResult, StoreWrite};
use crate::repo::Entity;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered in-memory table keyed by integer ids.
///
/// Keys `<= 0` are treated as unassigned and replaced by the next id on
/// insert. Failures can be queued with [`MemoryStore::fail_next_write`].
pub struct MemoryStore<T: Entity<Key = i64>> {
    table: &'static str,
    state: Mutex<MemoryTable<T>>,
    injected: Mutex<VecDeque<String>>,
    writes: AtomicUsize,
}

struct MemoryTable<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T: Entity<Key = i64>> MemoryStore<T> {
    pub fn new(table: &'static str) -> Self {
        Self::with_rows(table, Vec::new())
    }

    /// Seeds rows as if they had been persisted earlier.
    pub fn with_rows(table: &'static str, rows: Vec<T>) -> Self {
        let rows: BTreeMap<i64, T> = rows.into_iter().map(|row| (row.key(), row)).collect();
        let next_id = rows.keys().next_back().copied().unwrap_or(0).max(0) + 1;
        Self {
            table,
            state: Mutex::new(MemoryTable { rows, next_id }),
            injected: Mutex::new(VecDeque::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes the next write call fail with `Unavailable(message)`.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.injected.lock().push_back(message.into());
    }

    /// Number of successful write calls (a batch counts once).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current persisted rows, ordered by key.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().rows.values().cloned().collect()
    }

    fn take_injected(&self) -> StoreResult<()> {
        match self.injected.lock().pop_front() {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(()),
        }
    }

    fn finish_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: Entity<Key = i64>> MemoryTable<T> {
    fn insert(&mut self, table: &'static str, entity: &T) -> StoreResult<i64> {
        let mut row = entity.clone();
        let key = if row.key() <= 0 {
            let key = self.next_id;
            row.set_key(key);
            key
        } else {
            row.key()
        };
        if self.rows.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "duplicate key {key} in `{table}`"
            )));
        }
        self.next_id = self.next_id.max(key + 1);
        self.rows.insert(key, row);
        Ok(key)
    }

    fn update(&mut self, table: &'static str, entity: &T) -> StoreResult<i64> {
        let key = entity.key();
        match self.rows.get_mut(&key) {
            Some(row) => {
                *row = entity.clone();
                Ok(key)
            }
            None => Err(StoreError::MissingRow {
                table,
                key: key.to_string(),
            }),
        }
    }
}

impl<T: Entity<Key = i64>> Store<T> for MemoryStore<T> {
    fn load_all(&self) -> StoreResult<Vec<T>> {
        Ok(self.snapshot())
    }

    fn load(&self, key: &i64) -> StoreResult<Option<T>> {
        Ok(self.state.lock().rows.get(key).cloned())
    }

    fn insert(&self, entity: &T) -> StoreResult<i64> {
        self.take_injected()?;
        let key = self.state.lock().insert(self.table, entity)?;
        self.finish_write();
        Ok(key)
    }

    fn update(&self, entity: &T) -> StoreResult<()> {
        self.take_injected()?;
        self.state.lock().update(self.table, entity)?;
        self.finish_write();
        Ok(())
    }

    fn delete(&self, key: &i64) -> StoreResult<()> {
        self.take_injected()?;
        self.state.lock().rows.remove(key);
        self.finish_write();
        Ok(())
    }

    fn apply_batch(&self, writes: &[StoreWrite<'_, T>]) -> StoreResult<Vec<i64>> {
        self.take_injected()?;
        let mut state = self.state.lock();
        let mut staged = MemoryTable {
            rows: state.rows.clone(),
            next_id: state.next_id,
        };
        let mut keys = Vec::with_capacity(writes.len());
        for write in writes {
            let key = match write {
                StoreWrite::Insert(entity) => staged.insert(self.table, entity)?,
                StoreWrite::Update(entity) => staged.update(self.table, entity)?,
                StoreWrite::Delete(key) => {
                    staged.rows.remove(key);
                    *key
                }
            };
            keys.push(key);
        }
        *state = staged;
        drop(state);
        self.finish_write();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::repo::Entity;
    use crate::store::{Store, StoreError, StoreWrite};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        label: &'static str,
    }

    impl Entity for Row {
        type Key = i64;
        type Partition = ();

        fn key(&self) -> i64 {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = key;
        }

        fn partition(&self) {}
    }

    #[test]
    fn insert_assigns_ids_after_seeded_rows() {
        let store = MemoryStore::with_rows("rows", vec![Row { id: 7, label: "seed" }]);
        let key = store.insert(&Row { id: 0, label: "new" }).unwrap();
        assert_eq!(key, 8);
        assert_eq!(store.load(&8).unwrap().unwrap().label, "new");
    }

    #[test]
    fn failed_batch_leaves_rows_untouched() {
        let store = MemoryStore::with_rows("rows", vec![Row { id: 1, label: "a" }]);
        let fresh = Row { id: 0, label: "b" };
        let missing = Row { id: 99, label: "ghost" };
        let err = store
            .apply_batch(&[StoreWrite::Insert(&fresh), StoreWrite::Update(&missing)])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRow { .. }));
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn injected_failure_applies_to_one_write_only() {
        let store = MemoryStore::<Row>::new("rows");
        store.fail_next_write("disk full");
        assert!(matches!(
            store.insert(&Row { id: 0, label: "x" }),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.insert(&Row { id: 0, label: "x" }).unwrap(), 1);
    }
}
