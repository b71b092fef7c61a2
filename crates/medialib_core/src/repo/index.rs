//! Secondary indexes derived from the entity cache.
//!
//! # Invariants
//! - An index maps every projected value to exactly the keys of cached
//!   entities producing that value; empty key sets are never stored.
//! - Projections are pure functions of the entity.

use crate::repo::Entity;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

enum Projection<T, V> {
    Single(fn(&T) -> V),
    Multi(fn(&T) -> Vec<V>),
}

impl<T, V> Projection<T, V> {
    fn values(&self, entity: &T) -> Vec<V> {
        match self {
            Self::Single(project) => vec![project(entity)],
            Self::Multi(project) => project(entity),
        }
    }
}

impl<T, V> Clone for Projection<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Projection<T, V> {}

/// One projection-keyed lookup table.
///
/// Composite indexes use tuple values and support exact matches only.
pub struct Index<T: Entity, V> {
    name: &'static str,
    projection: Projection<T, V>,
    entries: HashMap<V, BTreeSet<T::Key>>,
}

impl<T: Entity, V: Hash + Eq + Clone> Index<T, V> {
    /// Index over a single value per entity.
    pub fn single(name: &'static str, project: fn(&T) -> V) -> Self {
        Self {
            name,
            projection: Projection::Single(project),
            entries: HashMap::new(),
        }
    }

    /// Index over zero or more values per entity (tags, memberships).
    pub fn multi(name: &'static str, project: fn(&T) -> Vec<V>) -> Self {
        Self {
            name,
            projection: Projection::Multi(project),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn insert(&mut self, entity: &T) {
        let key = entity.key();
        for value in self.projection.values(entity) {
            self.entries.entry(value).or_default().insert(key);
        }
    }

    pub fn remove(&mut self, entity: &T) {
        let key = entity.key();
        for value in self.projection.values(entity) {
            if let Some(keys) = self.entries.get_mut(&value) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.entries.remove(&value);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys whose projection produced `value`, in key order.
    pub fn keys(&self, value: &V) -> Vec<T::Key> {
        self.entries
            .get(value)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, value: &V) -> bool {
        self.entries.contains_key(value)
    }

    /// Distinct projected values currently indexed.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.keys()
    }

    /// Evaluates the projection directly, for uncached lookups.
    pub fn matches(&self, entity: &T, value: &V) -> bool {
        self.projection.values(entity).iter().any(|v| v == value)
    }

    pub fn same_entries(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// The full set of indexes declared for one entity type.
///
/// Implementations are usually a struct of [`Index`] fields forwarding each
/// call to every field.
pub trait IndexSet<T: Entity>: Send + Sync + 'static {
    /// Empty, unpopulated index set.
    fn empty() -> Self
    where
        Self: Sized;

    fn insert(&mut self, entity: &T);

    fn remove(&mut self, entity: &T);

    fn clear(&mut self);

    /// True when every index holds exactly the same entries as `other`.
    fn same_entries(&self, other: &Self) -> bool;

    fn rebuild<'a, I>(&mut self, entities: I)
    where
        I: Iterator<Item = &'a T>,
        T: 'a,
    {
        self.clear();
        for entity in entities {
            self.insert(entity);
        }
    }
}

/// Index set for repositories that declare no secondary indexes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoIndexes;

impl<T: Entity> IndexSet<T> for NoIndexes {
    fn empty() -> Self {
        Self
    }

    fn insert(&mut self, _entity: &T) {}

    fn remove(&mut self, _entity: &T) {}

    fn clear(&mut self) {}

    fn same_entries(&self, _other: &Self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Index;
    use crate::repo::Entity;

    #[derive(Debug, Clone, PartialEq)]
    struct Clip {
        id: i64,
        shelf: i64,
        labels: Vec<&'static str>,
    }

    impl Entity for Clip {
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

    fn clip(id: i64, shelf: i64, labels: &[&'static str]) -> Clip {
        Clip {
            id,
            shelf,
            labels: labels.to_vec(),
        }
    }

    #[test]
    fn single_index_moves_key_on_remove_then_insert() {
        let mut index = Index::single("by_shelf", |c: &Clip| c.shelf);
        let before = clip(1, 10, &[]);
        index.insert(&before);
        index.insert(&clip(2, 10, &[]));

        let after = clip(1, 20, &[]);
        index.remove(&before);
        index.insert(&after);

        assert_eq!(index.keys(&10), vec![2]);
        assert_eq!(index.keys(&20), vec![1]);
    }

    #[test]
    fn emptied_values_are_dropped() {
        let mut index = Index::multi("by_label", |c: &Clip| c.labels.clone());
        let only = clip(3, 1, &["drama", "comedy"]);
        index.insert(&only);
        index.remove(&only);
        assert!(!index.contains(&"drama"));
        assert_eq!(index.values().count(), 0);
    }

    #[test]
    fn composite_index_is_exact_match_only() {
        let mut index = Index::single("by_shelf_id", |c: &Clip| (c.shelf, c.id));
        index.insert(&clip(5, 2, &[]));
        assert_eq!(index.keys(&(2, 5)), vec![5]);
        assert!(index.keys(&(2, 6)).is_empty());
        assert!(index.matches(&clip(5, 2, &[]), &(2, 5)));
    }
}
