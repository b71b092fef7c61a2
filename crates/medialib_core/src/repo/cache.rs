//! In-memory mirror of one entity table plus its indexes.
//!
//! # Invariants
//! - When `populated`, `entities` equals the store's last committed state.
//! - Every mutation updates `entities` and `indexes` together, under the
//!   caller's exclusive lock.

use crate::repo::index::IndexSet;
use crate::repo::Entity;
use serde::Deserialize;
use std::collections::HashMap;

/// Whether a repository mirrors its table in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Full table in memory with secondary indexes.
    #[default]
    Cached,
    /// Every read goes to the store; indexes stay empty.
    Direct,
}

impl CacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Direct => "direct",
        }
    }
}

pub(crate) struct CacheState<T: Entity, I> {
    pub(crate) mode: CacheMode,
    pub(crate) populated: bool,
    /// False after `clear_indexes` until the next rebuild.
    pub(crate) indexed: bool,
    pub(crate) entities: HashMap<T::Key, T>,
    pub(crate) indexes: I,
}

impl<T: Entity, I: IndexSet<T>> CacheState<T, I> {
    pub(crate) fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            populated: false,
            indexed: false,
            entities: HashMap::new(),
            indexes: I::empty(),
        }
    }

    /// True when reads may be answered from memory.
    pub(crate) fn serves_reads(&self) -> bool {
        self.mode == CacheMode::Cached && self.populated
    }

    pub(crate) fn load(&mut self, entities: Vec<T>) {
        self.entities = entities
            .into_iter()
            .map(|entity| (entity.key(), entity))
            .collect();
        self.populated = true;
        self.populate_indexes();
    }

    /// True when index lookups may be answered from the live indexes.
    pub(crate) fn serves_index_reads(&self) -> bool {
        self.serves_reads() && self.indexed
    }

    pub(crate) fn populate_indexes(&mut self) {
        let Self {
            entities,
            indexes,
            indexed,
            ..
        } = self;
        indexes.rebuild(entities.values());
        *indexed = true;
    }

    pub(crate) fn clear_indexes(&mut self) {
        self.indexes.clear();
        self.indexed = false;
    }

    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        self.clear_indexes();
        self.populated = false;
    }

    pub(crate) fn upsert(&mut self, entity: &T) {
        if !self.serves_reads() {
            return;
        }
        let previous = self.entities.insert(entity.key(), entity.clone());
        if !self.indexed {
            return;
        }
        if let Some(previous) = previous {
            self.indexes.remove(&previous);
        }
        self.indexes.insert(entity);
    }

    pub(crate) fn remove(&mut self, key: &T::Key) {
        if !self.serves_reads() {
            return;
        }
        if let Some(previous) = self.entities.remove(key) {
            if self.indexed {
                self.indexes.remove(&previous);
            }
        }
    }

    /// Rebuilds every index from scratch and compares with the live ones.
    pub(crate) fn indexes_consistent(&self) -> bool {
        if !self.indexed {
            return true;
        }
        let mut fresh = I::empty();
        fresh.rebuild(self.entities.values());
        fresh.same_entries(&self.indexes)
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }
}
