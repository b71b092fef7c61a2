//! Entity contract shared by every repository.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// One record kind managed by a [`Repository`](crate::repo::Repository).
///
/// Entities are plain values: the repository owns the committed copy and
/// hands out clones, so `Clone` doubles as the "detached working copy"
/// operation and `PartialEq` drives unchanged-save detection.
pub trait Entity: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Primary key.
    type Key: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static;
    /// Change-tracker grouping key; `()` for unpartitioned types.
    type Partition: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Stores a key generated by the durable store on insert.
    fn set_key(&mut self, key: Self::Key);

    fn partition(&self) -> Self::Partition;
}
