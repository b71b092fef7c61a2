//! Scoped mutation builders.
//!
//! A scope stages detached working copies. Nothing is written, cached,
//! tracked or hooked until `commit`; dropping a scope discards it.
//! Domain validation (locked records and similar) is the caller's job
//! before `commit`.

use crate::repo::error::RepoResult;
use crate::repo::hooks::MutationHooks;
use crate::repo::index::IndexSet;
use crate::repo::repository::Repository;
use crate::repo::Entity;
use std::ops::{Deref, DerefMut};

/// New entity pending its first save.
pub struct AddScope<'r, T: Entity, I: IndexSet<T>, H: MutationHooks<T>> {
    repo: &'r Repository<T, I, H>,
    entity: T,
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> AddScope<'_, T, I, H> {
    pub fn commit(self, params: &H::Params) -> RepoResult<T> {
        self.repo.save(self.entity, params)
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> Deref for AddScope<'_, T, I, H> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> DerefMut for AddScope<'_, T, I, H> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entity
    }
}

/// Working copy of an existing entity plus its untouched original.
pub struct UpdateScope<'r, T: Entity, I: IndexSet<T>, H: MutationHooks<T>> {
    repo: &'r Repository<T, I, H>,
    original: T,
    entity: T,
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> UpdateScope<'_, T, I, H> {
    pub fn original(&self) -> &T {
        &self.original
    }

    pub fn is_changed(&self) -> bool {
        self.entity != self.original
    }

    /// Fails with `NotFound` if the entity was deleted after the scope began.
    pub fn commit(self, params: &H::Params) -> RepoResult<T> {
        self.repo.save_existing(self.entity, params)
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> Deref for UpdateScope<'_, T, I, H> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> DerefMut for UpdateScope<'_, T, I, H> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entity
    }
}

/// Update when the finder found an entity, add otherwise.
pub struct AddOrUpdateScope<'r, T: Entity, I: IndexSet<T>, H: MutationHooks<T>> {
    repo: &'r Repository<T, I, H>,
    original: Option<T>,
    entity: T,
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> AddOrUpdateScope<'_, T, I, H> {
    pub fn is_update(&self) -> bool {
        self.original.is_some()
    }

    pub fn original(&self) -> Option<&T> {
        self.original.as_ref()
    }

    pub fn commit(self, params: &H::Params) -> RepoResult<T> {
        if self.original.is_some() {
            self.repo.save_existing(self.entity, params)
        } else {
            self.repo.save(self.entity, params)
        }
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> Deref for AddOrUpdateScope<'_, T, I, H> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> DerefMut for AddOrUpdateScope<'_, T, I, H> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entity
    }
}

struct Member<T> {
    entity: T,
    touched: bool,
    created: bool,
}

/// A loaded set of entities edited together and saved in one batch.
///
/// Only members handed out mutably (or created) are saved; nothing is
/// deleted implicitly.
pub struct BatchUpdateScope<'r, T: Entity, I: IndexSet<T>, H: MutationHooks<T>> {
    repo: &'r Repository<T, I, H>,
    members: Vec<Member<T>>,
}

impl<T: Entity, I: IndexSet<T>, H: MutationHooks<T>> BatchUpdateScope<'_, T, I, H> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Read-only view of every member, loaded and created.
    pub fn members(&self) -> impl Iterator<Item = &T> + '_ {
        self.members.iter().map(|member| &member.entity)
    }

    /// First member matching `predicate`, marked for saving.
    pub fn find(&mut self, predicate: impl Fn(&T) -> bool) -> Option<&mut T> {
        let member = self
            .members
            .iter_mut()
            .find(|member| predicate(&member.entity))?;
        member.touched = true;
        Some(&mut member.entity)
    }

    /// Every member matching `predicate`, marked for saving.
    pub fn find_all(&mut self, predicate: impl Fn(&T) -> bool) -> Vec<&mut T> {
        self.members
            .iter_mut()
            .filter(|member| predicate(&member.entity))
            .map(|member| {
                member.touched = true;
                &mut member.entity
            })
            .collect()
    }

    /// Stages a new member built from `seed`.
    pub fn create(&mut self, seed: T) -> &mut T {
        self.members.push(Member {
            entity: seed,
            touched: true,
            created: true,
        });
        let last = self.members.len() - 1;
        &mut self.members[last].entity
    }

    /// Every member, all marked for saving.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.members.iter_mut().map(|member| {
            member.touched = true;
            &mut member.entity
        })
    }

    /// Number of members created in this scope.
    pub fn created(&self) -> usize {
        self.members.iter().filter(|member| member.created).count()
    }

    /// Saves touched and created members through `save_many`.
    pub fn commit(self, params: &H::Params) -> RepoResult<Vec<T>> {
        let staged: Vec<T> = self
            .members
            .into_iter()
            .filter(|member| member.touched)
            .map(|member| member.entity)
            .collect();
        self.repo.save_many(staged, params)
    }
}

impl<T, I, H> Repository<T, I, H>
where
    T: Entity,
    I: IndexSet<T>,
    H: MutationHooks<T>,
{
    /// Scope over a default-constructed working copy.
    pub fn begin_add(&self) -> AddScope<'_, T, I, H>
    where
        T: Default,
    {
        self.begin_add_with(T::default())
    }

    /// Scope over a caller-built working copy; an unassigned key is
    /// generated by the store on commit.
    pub fn begin_add_with(&self, seed: T) -> AddScope<'_, T, I, H> {
        AddScope {
            repo: self,
            entity: seed,
        }
    }

    /// `Ok(None)` when `key` does not exist.
    pub fn begin_update(&self, key: &T::Key) -> RepoResult<Option<UpdateScope<'_, T, I, H>>> {
        Ok(self.get(key)?.map(|entity| self.begin_update_entity(&entity)))
    }

    /// Scope over a copy of an entity the caller already holds.
    pub fn begin_update_entity(&self, entity: &T) -> UpdateScope<'_, T, I, H> {
        UpdateScope {
            repo: self,
            original: entity.clone(),
            entity: entity.clone(),
        }
    }

    pub fn begin_add_or_update(
        &self,
        finder: impl FnOnce() -> RepoResult<Option<T>>,
        constructor: impl FnOnce() -> T,
    ) -> RepoResult<AddOrUpdateScope<'_, T, I, H>> {
        let scope = match finder()? {
            Some(found) => AddOrUpdateScope {
                repo: self,
                entity: found.clone(),
                original: Some(found),
            },
            None => AddOrUpdateScope {
                repo: self,
                entity: constructor(),
                original: None,
            },
        };
        Ok(scope)
    }

    pub fn begin_batch_update(
        &self,
        finder: impl FnOnce() -> RepoResult<Vec<T>>,
    ) -> RepoResult<BatchUpdateScope<'_, T, I, H>> {
        let members = finder()?
            .into_iter()
            .map(|entity| Member {
                entity,
                touched: false,
                created: false,
            })
            .collect();
        Ok(BatchUpdateScope {
            repo: self,
            members,
        })
    }
}
