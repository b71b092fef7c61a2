//! Generic write-through repository.
//!
//! # Responsibility
//! - Serve reads from the entity cache (or the store in direct mode).
//! - Run every Save/Delete through Begin hook, durable write, cache+index
//!   update, change tracking and End hook, in that order.
//!
//! # Invariants
//! - Writers to one repository are serialized by `commit`; cache-visible
//!   states follow commit order.
//! - The cache write lock covers only the cache+index update, never a hook.
//! - A failed durable write leaves cache, index and tracker untouched.
//! - End hooks run after `commit` is released; their failure does not undo
//!   the primary mutation.

use crate::repo::cache::{CacheMode, CacheState};
use crate::repo::error::{HookError, RepoError, RepoResult};
use crate::repo::guard::CacheGuard;
use crate::repo::hooks::{MutationHooks, NoHooks};
use crate::repo::index::{Index, IndexSet, NoIndexes};
use crate::repo::tracker::ChangeTracker;
use crate::repo::Entity;
use crate::store::{Store, StoreError, StoreWrite};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time counters readable without a write lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDiagnostics {
    pub name: &'static str,
    pub mode: CacheMode,
    pub cached: usize,
    pub pending_changes: usize,
}

/// Cached repository for one entity type.
///
/// `I` declares the secondary indexes, `H` the Begin/End hooks and the
/// typed parameters every mutation takes.
pub struct Repository<T: Entity, I: IndexSet<T> = NoIndexes, H: MutationHooks<T> = NoHooks> {
    name: &'static str,
    store: Arc<dyn Store<T>>,
    hooks: H,
    cache: CacheGuard<CacheState<T, I>>,
    commit: Mutex<()>,
    tracker: ChangeTracker<T::Key, T::Partition>,
    cached: AtomicUsize,
}

type Staged<T, C> = (T, Option<T>, C);

impl<T, I, H> Repository<T, I, H>
where
    T: Entity,
    I: IndexSet<T>,
    H: MutationHooks<T>,
{
    pub fn new(name: &'static str, store: Arc<dyn Store<T>>, mode: CacheMode, hooks: H) -> Self {
        Self {
            name,
            store,
            hooks,
            cache: CacheGuard::new(CacheState::new(mode)),
            commit: Mutex::new(()),
            tracker: ChangeTracker::new(),
            cached: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn tracker(&self) -> &ChangeTracker<T::Key, T::Partition> {
        &self.tracker
    }

    pub fn mode(&self) -> CacheMode {
        self.cache.read(|state| state.mode)
    }

    pub fn is_populated(&self) -> bool {
        self.cache.read(|state| state.populated)
    }

    pub fn diagnostics(&self) -> RepositoryDiagnostics {
        RepositoryDiagnostics {
            name: self.name,
            mode: self.mode(),
            cached: self.cached.load(Ordering::Acquire),
            pending_changes: self.tracker.pending(),
        }
    }

    /// Loads the whole table into memory and builds every index.
    ///
    /// No-op returning `0` in direct mode.
    pub fn populate(&self) -> RepoResult<usize> {
        let _commit = self.commit.lock();
        if self.mode() == CacheMode::Direct {
            info!(
                "event=repo_populate module=repo status=skipped repository={} mode=direct",
                self.name
            );
            return Ok(0);
        }
        let entities = self.store.load_all().map_err(|source| {
            error!(
                "event=repo_populate module=repo status=error repository={} error={source}",
                self.name
            );
            self.store_error(source)
        })?;
        let count = self.cache.write(|state| {
            state.load(entities);
            state.len()
        });
        self.cached.store(count, Ordering::Release);
        info!(
            "event=repo_populate module=repo status=ok repository={} count={count}",
            self.name
        );
        Ok(count)
    }

    /// Drops cached entities; reads fall back to the store until the next
    /// `populate`.
    pub fn clear_cache(&self) {
        let _commit = self.commit.lock();
        self.cache.write(CacheState::clear);
        self.cached.store(0, Ordering::Release);
    }

    pub fn populate_indexes(&self) {
        self.cache.write(|state| {
            if state.serves_reads() {
                state.populate_indexes();
            }
        });
    }

    /// Empties every index; lookups scan the cache until the next rebuild.
    pub fn clear_indexes(&self) {
        self.cache.write(CacheState::clear_indexes);
    }

    /// Converts a live repository between cached and direct mode.
    pub fn switch_mode(&self, mode: CacheMode) -> RepoResult<()> {
        let _commit = self.commit.lock();
        if self.mode() == mode {
            return Ok(());
        }
        let count = match mode {
            CacheMode::Cached => {
                let entities = self
                    .store
                    .load_all()
                    .map_err(|source| self.store_error(source))?;
                self.cache.write(|state| {
                    state.mode = CacheMode::Cached;
                    state.load(entities);
                    state.len()
                })
            }
            CacheMode::Direct => self.cache.write(|state| {
                state.clear();
                state.mode = CacheMode::Direct;
                0
            }),
        };
        self.cached.store(count, Ordering::Release);
        info!(
            "event=repo_switch_mode module=repo status=ok repository={} mode={} count={count}",
            self.name,
            mode.as_str()
        );
        Ok(())
    }

    /// Rebuilds every index from the cache and compares with the live ones.
    pub fn verify_indexes(&self) -> bool {
        self.cache
            .read(|state| !state.serves_reads() || state.indexes_consistent())
    }

    /// Missing keys yield `Ok(None)`.
    pub fn get(&self, key: &T::Key) -> RepoResult<Option<T>> {
        self.load_current(key)
    }

    /// Entities for `keys` in input order; misses are skipped.
    pub fn get_many(&self, keys: &[T::Key]) -> RepoResult<Vec<T>> {
        let cached = self.cache.read(|state| {
            state.serves_reads().then(|| {
                keys.iter()
                    .filter_map(|key| state.entities.get(key).cloned())
                    .collect::<Vec<_>>()
            })
        });
        if let Some(hits) = cached {
            return Ok(hits);
        }
        let mut hits = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self
                .store
                .load(key)
                .map_err(|source| self.store_error(source))?
            {
                hits.push(entity);
            }
        }
        Ok(hits)
    }

    /// Every entity, ordered by key.
    pub fn get_all(&self) -> RepoResult<Vec<T>> {
        self.find(|_| true)
    }

    /// Entities matching `predicate`, ordered by key.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> RepoResult<Vec<T>> {
        let cached = self.cache.read(|state| {
            state.serves_reads().then(|| {
                state
                    .entities
                    .values()
                    .filter(|entity| predicate(entity))
                    .cloned()
                    .collect::<Vec<_>>()
            })
        });
        let mut found = match cached {
            Some(found) => found,
            None => self
                .store
                .load_all()
                .map_err(|source| self.store_error(source))?
                .into_iter()
                .filter(|entity| predicate(entity))
                .collect(),
        };
        found.sort_by_key(|entity| entity.key());
        Ok(found)
    }

    pub fn find_one(&self, predicate: impl Fn(&T) -> bool) -> RepoResult<Option<T>> {
        Ok(self.find(predicate)?.into_iter().next())
    }

    /// Entities whose projection in the selected index equals `value`,
    /// ordered by key.
    ///
    /// Uncached repositories evaluate the projection over a full store scan.
    pub fn lookup<V>(&self, select: impl Fn(&I) -> &Index<T, V>, value: &V) -> RepoResult<Vec<T>>
    where
        V: Hash + Eq + Clone,
    {
        let cached = self.cache.read(|state| {
            if state.serves_index_reads() {
                let keys = select(&state.indexes).keys(value);
                return Some(
                    keys.iter()
                        .filter_map(|key| state.entities.get(key).cloned())
                        .collect::<Vec<_>>(),
                );
            }
            if state.serves_reads() {
                let index = select(&state.indexes);
                let mut hits: Vec<T> = state
                    .entities
                    .values()
                    .filter(|entity| index.matches(entity, value))
                    .cloned()
                    .collect();
                hits.sort_by_key(|entity| entity.key());
                return Some(hits);
            }
            None
        });
        if let Some(hits) = cached {
            return Ok(hits);
        }

        let all = self
            .store
            .load_all()
            .map_err(|source| self.store_error(source))?;
        let mut hits: Vec<T> = self.cache.read(|state| {
            let index = select(&state.indexes);
            all.into_iter()
                .filter(|entity| index.matches(entity, value))
                .collect()
        });
        hits.sort_by_key(|entity| entity.key());
        Ok(hits)
    }

    /// Keys-only form of [`lookup`](Self::lookup).
    pub fn lookup_keys<V>(
        &self,
        select: impl Fn(&I) -> &Index<T, V>,
        value: &V,
    ) -> RepoResult<Vec<T::Key>>
    where
        V: Hash + Eq + Clone,
    {
        let indexed = self.cache.read(|state| {
            state
                .serves_index_reads()
                .then(|| select(&state.indexes).keys(value))
        });
        match indexed {
            Some(keys) => Ok(keys),
            None => Ok(self
                .lookup(select, value)?
                .iter()
                .map(Entity::key)
                .collect()),
        }
    }

    /// Inserts or updates one entity and returns the committed value.
    pub fn save(&self, entity: T, params: &H::Params) -> RepoResult<T> {
        self.save_with(entity, params, false)
    }

    /// Like [`save`](Self::save) but fails with `NotFound` when the entity no
    /// longer exists.
    pub(crate) fn save_existing(&self, entity: T, params: &H::Params) -> RepoResult<T> {
        self.save_with(entity, params, true)
    }

    /// Saves in input order with one durable round trip.
    ///
    /// Begin hooks all run before the write and End hooks all run after it;
    /// the first End hook failure is returned once every hook has run.
    pub fn save_many(&self, entities: Vec<T>, params: &H::Params) -> RepoResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let staged = {
            let _commit = self.commit.lock();
            let mut staged: Vec<Staged<T, H::SaveContext>> = Vec::with_capacity(entities.len());
            let mut updated_at: HashMap<T::Key, usize> = HashMap::new();
            for mut entity in entities {
                let key = entity.key();
                let original = match updated_at.get(&key) {
                    Some(&position) => Some(staged[position].0.clone()),
                    None => self.load_current(&key)?,
                };
                let context = self
                    .hooks
                    .begin_save(&mut entity, original.as_ref(), params)
                    .map_err(|source| self.begin_error(entity.key(), source))?;
                if original.is_some() {
                    updated_at.insert(entity.key(), staged.len());
                }
                staged.push((entity, original, context));
            }
            self.commit_batch(&mut staged)?;
            staged
        };

        let mut first_error = None;
        let mut saved = Vec::with_capacity(staged.len());
        for (entity, _, context) in staged {
            if let Err(source) = self.hooks.end_save(&entity, context, params) {
                let err = self.cascade_error(entity.key(), source);
                first_error.get_or_insert(err);
            }
            saved.push(entity);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }

    /// Read-modify-write of one entity under the commit mutex.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    pub fn modify(
        &self,
        key: &T::Key,
        change: impl FnOnce(&mut T),
        params: &H::Params,
    ) -> RepoResult<Option<T>> {
        let (entity, context) = {
            let _commit = self.commit.lock();
            let Some(original) = self.load_current(key)? else {
                return Ok(None);
            };
            let mut entity = original.clone();
            change(&mut entity);
            self.commit_save(entity, Some(original), params)?
        };
        self.finish_save(entity, context, params).map(Some)
    }

    /// Re-saves an entity unchanged so its hooks recompute derived state.
    pub fn touch(&self, key: &T::Key, params: &H::Params) -> RepoResult<Option<T>> {
        self.modify(key, |_| {}, params)
    }

    /// Deletes one entity; an absent key yields `Ok(None)` and runs no hooks.
    pub fn delete(&self, key: &T::Key, params: &H::Params) -> RepoResult<Option<T>> {
        let (entity, context) = {
            let _commit = self.commit.lock();
            let Some(entity) = self.load_current(key)? else {
                return Ok(None);
            };
            let context = self
                .hooks
                .begin_delete(&entity, params)
                .map_err(|source| self.begin_error(*key, source))?;
            self.store
                .delete(key)
                .map_err(|source| self.store_error(source))?;
            self.apply_remove(std::slice::from_ref(key));
            self.tracker.remove(entity.partition(), *key);
            debug!(
                "event=repo_delete module=repo status=ok repository={} key={key}",
                self.name
            );
            (entity, context)
        };
        match self.hooks.end_delete(&entity, context, params) {
            Ok(()) => Ok(Some(entity)),
            Err(source) => Err(self.cascade_error(entity.key(), source)),
        }
    }

    /// Deletes every existing key in one durable round trip; misses are
    /// skipped.
    pub fn delete_many(&self, keys: &[T::Key], params: &H::Params) -> RepoResult<Vec<T>> {
        let staged = {
            let _commit = self.commit.lock();
            let mut staged: Vec<(T, H::DeleteContext)> = Vec::with_capacity(keys.len());
            for key in keys {
                if staged.iter().any(|(entity, _)| entity.key() == *key) {
                    continue;
                }
                let Some(entity) = self.load_current(key)? else {
                    continue;
                };
                let context = self
                    .hooks
                    .begin_delete(&entity, params)
                    .map_err(|source| self.begin_error(*key, source))?;
                staged.push((entity, context));
            }
            if staged.is_empty() {
                return Ok(Vec::new());
            }
            let writes: Vec<StoreWrite<'_, T>> = staged
                .iter()
                .map(|(entity, _)| StoreWrite::Delete(entity.key()))
                .collect();
            self.store
                .apply_batch(&writes)
                .map_err(|source| self.store_error(source))?;
            let removed: Vec<T::Key> = staged.iter().map(|(entity, _)| entity.key()).collect();
            self.apply_remove(&removed);
            self.tracker.remove_range(
                staged
                    .iter()
                    .map(|(entity, _)| (entity.partition(), entity.key())),
            );
            debug!(
                "event=repo_delete module=repo status=ok repository={} count={}",
                self.name,
                staged.len()
            );
            staged
        };

        let mut first_error = None;
        let mut deleted = Vec::with_capacity(staged.len());
        for (entity, context) in staged {
            if let Err(source) = self.hooks.end_delete(&entity, context, params) {
                let err = self.cascade_error(entity.key(), source);
                first_error.get_or_insert(err);
            }
            deleted.push(entity);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(deleted),
        }
    }

    /// Deletes every entity matching `predicate`.
    pub fn find_and_delete(
        &self,
        predicate: impl Fn(&T) -> bool,
        params: &H::Params,
    ) -> RepoResult<Vec<T>> {
        let keys: Vec<T::Key> = self.find(predicate)?.iter().map(Entity::key).collect();
        self.delete_many(&keys, params)
    }

    fn save_with(&self, entity: T, params: &H::Params, require_existing: bool) -> RepoResult<T> {
        let (entity, context) = {
            let _commit = self.commit.lock();
            let original = self.load_current(&entity.key())?;
            if require_existing && original.is_none() {
                return Err(RepoError::NotFound {
                    repository: self.name,
                    key: entity.key().to_string(),
                });
            }
            self.commit_save(entity, original, params)?
        };
        self.finish_save(entity, context, params)
    }

    /// Begin hook, durable write, cache and tracker. Caller holds `commit`.
    fn commit_save(
        &self,
        mut entity: T,
        original: Option<T>,
        params: &H::Params,
    ) -> RepoResult<(T, H::SaveContext)> {
        let context = self
            .hooks
            .begin_save(&mut entity, original.as_ref(), params)
            .map_err(|source| self.begin_error(entity.key(), source))?;

        match &original {
            Some(previous) if *previous == entity => {
                trace!(
                    "event=repo_save module=repo status=unchanged repository={} key={}",
                    self.name,
                    entity.key()
                );
            }
            Some(_) => {
                self.store
                    .update(&entity)
                    .map_err(|source| self.store_error(source))?;
                self.apply_upsert(std::slice::from_ref(&entity));
                self.tracker.add_or_update(entity.partition(), entity.key());
                debug!(
                    "event=repo_save module=repo status=ok repository={} key={} op=update",
                    self.name,
                    entity.key()
                );
            }
            None => {
                let key = self
                    .store
                    .insert(&entity)
                    .map_err(|source| self.store_error(source))?;
                entity.set_key(key);
                self.apply_upsert(std::slice::from_ref(&entity));
                self.tracker.add(entity.partition(), key);
                debug!(
                    "event=repo_save module=repo status=ok repository={} key={key} op=insert",
                    self.name
                );
            }
        }
        Ok((entity, context))
    }

    /// Durable batch write plus cache and tracker update for staged saves.
    fn commit_batch(&self, staged: &mut [Staged<T, H::SaveContext>]) -> RepoResult<()> {
        let changed: Vec<usize> = staged
            .iter()
            .enumerate()
            .filter(|(_, (entity, original, _))| original.as_ref() != Some(entity))
            .map(|(position, _)| position)
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        let keys = {
            let writes: Vec<StoreWrite<'_, T>> = changed
                .iter()
                .map(|&position| {
                    let (entity, original, _) = &staged[position];
                    match original {
                        Some(_) => StoreWrite::Update(entity),
                        None => StoreWrite::Insert(entity),
                    }
                })
                .collect();
            self.store
                .apply_batch(&writes)
                .map_err(|source| self.store_error(source))?
        };
        for (&position, key) in changed.iter().zip(keys) {
            staged[position].0.set_key(key);
        }

        let count = self.cache.write(|state| {
            for &position in &changed {
                state.upsert(&staged[position].0);
            }
            state.len()
        });
        self.publish_count(count);

        let (inserted, updated): (Vec<usize>, Vec<usize>) = changed
            .iter()
            .copied()
            .partition(|&position| staged[position].1.is_none());
        self.tracker.add_range(
            inserted
                .iter()
                .map(|&position| (staged[position].0.partition(), staged[position].0.key())),
        );
        self.tracker.add_or_update_range(
            updated
                .iter()
                .map(|&position| (staged[position].0.partition(), staged[position].0.key())),
        );
        debug!(
            "event=repo_save module=repo status=ok repository={} count={} op=batch",
            self.name,
            changed.len()
        );
        Ok(())
    }

    fn finish_save(
        &self,
        entity: T,
        context: H::SaveContext,
        params: &H::Params,
    ) -> RepoResult<T> {
        match self.hooks.end_save(&entity, context, params) {
            Ok(()) => Ok(entity),
            Err(source) => Err(self.cascade_error(entity.key(), source)),
        }
    }

    /// Committed value of `key`: cache when populated, store otherwise.
    fn load_current(&self, key: &T::Key) -> RepoResult<Option<T>> {
        let cached = self.cache.read(|state| {
            state
                .serves_reads()
                .then(|| state.entities.get(key).cloned())
        });
        match cached {
            Some(hit) => Ok(hit),
            None => self
                .store
                .load(key)
                .map_err(|source| self.store_error(source)),
        }
    }

    fn apply_upsert(&self, entities: &[T]) {
        let count = self.cache.write(|state| {
            for entity in entities {
                state.upsert(entity);
            }
            state.len()
        });
        self.publish_count(count);
    }

    fn apply_remove(&self, keys: &[T::Key]) {
        let count = self.cache.write(|state| {
            for key in keys {
                state.remove(key);
            }
            state.len()
        });
        self.publish_count(count);
    }

    fn publish_count(&self, count: usize) {
        self.cached.store(count, Ordering::Release);
    }

    fn store_error(&self, source: StoreError) -> RepoError {
        RepoError::Store {
            repository: self.name,
            source,
        }
    }

    fn begin_error(&self, key: T::Key, source: HookError) -> RepoError {
        debug!(
            "event=repo_begin_hook module=repo status=rejected repository={} key={key} error={source}",
            self.name
        );
        RepoError::BeginHook {
            repository: self.name,
            key: key.to_string(),
            source,
        }
    }

    fn cascade_error(&self, key: T::Key, source: HookError) -> RepoError {
        warn!(
            "event=cascade_failed module=repo status=error repository={} key={key} error={source}",
            self.name
        );
        RepoError::Cascade {
            repository: self.name,
            key: key.to_string(),
            source,
        }
    }
}
