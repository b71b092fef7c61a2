//! Change tracking for incremental consumers.
//!
//! # Responsibility
//! - Record which keys were added, updated or removed since each consumer's
//!   last checkpoint.
//! - Let independent consumers (one per partition, or one global) advance
//!   their own cursors.
//!
//! # Invariants
//! - A key added and removed inside one unconsumed window is reported as
//!   removed only.
//! - Entries every interested consumer has seen are compacted away.
//! - Changes no subscribed consumer covers are not retained, so an
//!   unobserved tracker stays empty.
//! - The tracker lock is never held while a cache lock is acquired.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Partitions a consumer is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerScope<G> {
    All,
    Partition(G),
}

impl<G: Eq> TrackerScope<G> {
    fn covers(&self, partition: &G) -> bool {
        match self {
            Self::All => true,
            Self::Partition(wanted) => wanted == partition,
        }
    }
}

/// Handle returned by [`ChangeTracker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

/// Keys touched since a consumer's previous drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<K: Ord> {
    pub added: BTreeSet<K>,
    pub updated: BTreeSet<K>,
    pub removed: BTreeSet<K>,
    /// Sequence number the consumer has now observed.
    pub cursor: u64,
}

impl<K: Ord> ChangeSet<K> {
    fn empty(cursor: u64) -> Self {
        Self {
            added: BTreeSet::new(),
            updated: BTreeSet::new(),
            removed: BTreeSet::new(),
            cursor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

#[derive(Debug)]
struct Entry<G> {
    partition: G,
    live: bool,
    created_seq: Option<u64>,
    last_seq: u64,
}

#[derive(Debug)]
struct Consumer<G> {
    scope: TrackerScope<G>,
    cursor: u64,
}

struct TrackerState<K, G> {
    seq: u64,
    next_consumer: u64,
    entries: HashMap<K, Entry<G>>,
    consumers: HashMap<ConsumerId, Consumer<G>>,
}

/// Per-type change tracker, optionally partitioned by `G`.
pub struct ChangeTracker<K, G = ()> {
    state: Mutex<TrackerState<K, G>>,
    pending: AtomicUsize,
}

impl<K, G> Default for ChangeTracker<K, G>
where
    K: Copy + Eq + Ord + Hash,
    G: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, G> ChangeTracker<K, G>
where
    K: Copy + Eq + Ord + Hash,
    G: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                seq: 0,
                next_consumer: 1,
                entries: HashMap::new(),
                consumers: HashMap::new(),
            }),
            pending: AtomicUsize::new(0),
        }
    }

    /// Number of keys with unconsumed changes. Lock-free.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Registers a consumer that sees every change still retained.
    pub fn subscribe(&self, scope: TrackerScope<G>) -> ConsumerId {
        let mut state = self.state.lock();
        let id = ConsumerId(state.next_consumer);
        state.next_consumer += 1;
        state.consumers.insert(id, Consumer { scope, cursor: 0 });
        id
    }

    pub fn unsubscribe(&self, consumer: ConsumerId) -> bool {
        let mut state = self.state.lock();
        let removed = state.consumers.remove(&consumer).is_some();
        if removed {
            state.compact();
            self.publish(&state);
        }
        removed
    }

    pub fn add(&self, partition: G, key: K) {
        self.add_range([(partition, key)]);
    }

    pub fn add_or_update(&self, partition: G, key: K) {
        self.add_or_update_range([(partition, key)]);
    }

    pub fn remove(&self, partition: G, key: K) {
        self.remove_range([(partition, key)]);
    }

    pub fn add_range(&self, keys: impl IntoIterator<Item = (G, K)>) {
        self.record(keys, |entry, seq| {
            entry.live = true;
            entry.created_seq = Some(seq);
        });
    }

    pub fn add_or_update_range(&self, keys: impl IntoIterator<Item = (G, K)>) {
        self.record(keys, |entry, seq| {
            if !entry.live {
                entry.live = true;
                entry.created_seq = Some(seq);
            }
        });
    }

    pub fn remove_range(&self, keys: impl IntoIterator<Item = (G, K)>) {
        self.record(keys, |entry, _| entry.live = false);
    }

    /// Returns changes since the consumer's cursor and advances it.
    ///
    /// `None` when the consumer is not subscribed.
    pub fn drain(&self, consumer: ConsumerId) -> Option<ChangeSet<K>> {
        let mut state = self.state.lock();
        let changes = state.collect(consumer)?;
        let seq = state.seq;
        if let Some(entry) = state.consumers.get_mut(&consumer) {
            entry.cursor = seq;
        }
        state.compact();
        self.publish(&state);
        Some(changes)
    }

    /// Same as [`drain`](Self::drain) without advancing the cursor.
    pub fn peek(&self, consumer: ConsumerId) -> Option<ChangeSet<K>> {
        self.state.lock().collect(consumer)
    }

    fn record(&self, keys: impl IntoIterator<Item = (G, K)>, apply: impl Fn(&mut Entry<G>, u64)) {
        let mut state = self.state.lock();
        for (partition, key) in keys {
            state.seq += 1;
            let seq = state.seq;
            if !state.observed(&partition) {
                state.entries.remove(&key);
                continue;
            }
            let entry = state.entries.entry(key).or_insert_with(|| Entry {
                partition: partition.clone(),
                live: true,
                created_seq: None,
                last_seq: seq,
            });
            entry.partition = partition;
            entry.last_seq = seq;
            apply(entry, seq);
        }
        self.publish(&state);
    }

    fn publish(&self, state: &TrackerState<K, G>) {
        self.pending.store(state.entries.len(), Ordering::Release);
    }
}

impl<K, G> TrackerState<K, G>
where
    K: Copy + Eq + Ord + Hash,
    G: Clone + Eq + Hash,
{
    fn collect(&self, consumer: ConsumerId) -> Option<ChangeSet<K>> {
        let Consumer { scope, cursor } = self.consumers.get(&consumer)?;
        let mut changes = ChangeSet::empty(self.seq);
        for (key, entry) in &self.entries {
            if entry.last_seq <= *cursor || !scope.covers(&entry.partition) {
                continue;
            }
            if !entry.live {
                changes.removed.insert(*key);
            } else if entry.created_seq.is_some_and(|created| created > *cursor) {
                changes.added.insert(*key);
            } else {
                changes.updated.insert(*key);
            }
        }
        Some(changes)
    }

    fn observed(&self, partition: &G) -> bool {
        self.consumers.values().any(|c| c.scope.covers(partition))
    }

    fn compact(&mut self) {
        let consumers = &self.consumers;
        self.entries.retain(|_, entry| {
            consumers
                .values()
                .any(|c| c.scope.covers(&entry.partition) && c.cursor < entry.last_seq)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeTracker, TrackerScope};
    use std::collections::BTreeSet;

    #[test]
    fn add_then_remove_collapses_to_removed() {
        let tracker: ChangeTracker<i64> = ChangeTracker::new();
        let consumer = tracker.subscribe(TrackerScope::All);
        tracker.add((), 7);
        tracker.remove((), 7);

        let changes = tracker.drain(consumer).unwrap();
        assert!(changes.added.is_empty());
        assert_eq!(changes.removed, BTreeSet::from([7]));
    }

    #[test]
    fn drained_entries_are_compacted() {
        let tracker: ChangeTracker<i64> = ChangeTracker::new();
        let consumer = tracker.subscribe(TrackerScope::All);
        tracker.add_range([((), 1), ((), 2)]);
        assert_eq!(tracker.pending(), 2);

        let _ = tracker.drain(consumer).unwrap();
        assert_eq!(tracker.pending(), 0);
        assert!(tracker.drain(consumer).unwrap().is_empty());
    }

    #[test]
    fn update_after_checkpoint_is_reported_as_updated() {
        let tracker: ChangeTracker<i64> = ChangeTracker::new();
        let consumer = tracker.subscribe(TrackerScope::All);
        tracker.add((), 3);
        let first = tracker.drain(consumer).unwrap();
        assert_eq!(first.added, BTreeSet::from([3]));

        tracker.add_or_update((), 3);
        let second = tracker.drain(consumer).unwrap();
        assert_eq!(second.updated, BTreeSet::from([3]));
        assert!(second.added.is_empty());
    }

    #[test]
    fn changes_without_consumers_are_not_retained() {
        let tracker: ChangeTracker<i64, u8> = ChangeTracker::new();
        tracker.add_range([(1, 1), (2, 2)]);
        tracker.add_or_update(1, 1);
        assert_eq!(tracker.pending(), 0);

        let only_first = tracker.subscribe(TrackerScope::Partition(1));
        tracker.add(1, 3);
        tracker.add(2, 4);
        assert_eq!(tracker.pending(), 1);
        assert_eq!(tracker.drain(only_first).unwrap().added, BTreeSet::from([3]));
        assert_eq!(tracker.pending(), 0);

        tracker.add(1, 5);
        assert!(tracker.unsubscribe(only_first));
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn unknown_consumer_drains_nothing() {
        let tracker: ChangeTracker<i64> = ChangeTracker::new();
        let consumer = tracker.subscribe(TrackerScope::All);
        assert!(tracker.unsubscribe(consumer));
        assert!(tracker.drain(consumer).is_none());
    }
}
