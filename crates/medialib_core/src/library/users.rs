//! Per-user watched state and its group rollups.
//!
//! # Invariants
//! - `GroupUser` counters are recomputed inside `begin_save` from the
//!   episode and episode-user caches.
//! - A watched-state change refreshes the owning group and its ancestors
//!   for that user only.

use super::{attach, Library};
use crate::model::{EpisodeId, EpisodeUser, GroupId, GroupUser, UserId};
use crate::repo::{
    AncestorWalk, HookError, HookResult, Index, IndexSet, MutationHooks, RepoResult, Repository,
};
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Weak;

pub type EpisodeUserRepository = Repository<EpisodeUser, EpisodeUserIndexes, EpisodeUserHooks>;
pub type GroupUserRepository = Repository<GroupUser, GroupUserIndexes, GroupUserHooks>;

pub struct EpisodeUserIndexes {
    pub by_user: Index<EpisodeUser, UserId>,
    pub by_episode: Index<EpisodeUser, EpisodeId>,
    pub by_user_episode: Index<EpisodeUser, (UserId, EpisodeId)>,
}

impl IndexSet<EpisodeUser> for EpisodeUserIndexes {
    fn empty() -> Self {
        Self {
            by_user: Index::single("by_user", |r: &EpisodeUser| r.user_id),
            by_episode: Index::single("by_episode", |r: &EpisodeUser| r.episode_id),
            by_user_episode: Index::single("by_user_episode", |r: &EpisodeUser| {
                (r.user_id, r.episode_id)
            }),
        }
    }

    fn insert(&mut self, entity: &EpisodeUser) {
        self.by_user.insert(entity);
        self.by_episode.insert(entity);
        self.by_user_episode.insert(entity);
    }

    fn remove(&mut self, entity: &EpisodeUser) {
        self.by_user.remove(entity);
        self.by_episode.remove(entity);
        self.by_user_episode.remove(entity);
    }

    fn clear(&mut self) {
        self.by_user.clear();
        self.by_episode.clear();
        self.by_user_episode.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_user.same_entries(&other.by_user)
            && self.by_episode.same_entries(&other.by_episode)
            && self.by_user_episode.same_entries(&other.by_user_episode)
    }
}

pub struct EpisodeUserHooks {
    library: Weak<Library>,
}

impl EpisodeUserHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self { library }
    }

    fn refresh(&self, user_id: UserId, episodes: &[EpisodeId]) -> HookResult<()> {
        let library = attach(&self.library, "episode_users")?;
        let mut groups = BTreeSet::new();
        for episode_id in episodes {
            if let Some(group_id) = library.owning_group(*episode_id)? {
                groups.insert(group_id);
            }
        }
        for group_id in groups {
            library.group_users().refresh(library.as_ref(), user_id, group_id)?;
        }
        Ok(())
    }
}

impl MutationHooks<EpisodeUser> for EpisodeUserHooks {
    type Params = ();
    /// Episode the record pointed at before it was re-targeted.
    type SaveContext = Option<EpisodeId>;
    type DeleteContext = ();

    fn begin_save(
        &self,
        entity: &mut EpisodeUser,
        original: Option<&EpisodeUser>,
        _params: &(),
    ) -> HookResult<Option<EpisodeId>> {
        let library = attach(&self.library, "episode_users")?;
        if library.episodes().get(&entity.episode_id)?.is_none() {
            return Err(HookError::Rejected(format!(
                "episode {} does not exist",
                entity.episode_id
            )));
        }
        Ok(original
            .map(|previous| previous.episode_id)
            .filter(|previous| *previous != entity.episode_id))
    }

    fn end_save(
        &self,
        entity: &EpisodeUser,
        previous: Option<EpisodeId>,
        _params: &(),
    ) -> HookResult<()> {
        let mut episodes = vec![entity.episode_id];
        episodes.extend(previous);
        self.refresh(entity.user_id, &episodes)
    }

    fn begin_delete(&self, _entity: &EpisodeUser, _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn end_delete(&self, entity: &EpisodeUser, _context: (), _params: &()) -> HookResult<()> {
        self.refresh(entity.user_id, &[entity.episode_id])
    }
}

impl EpisodeUserRepository {
    pub fn for_user(&self, user_id: UserId) -> RepoResult<Vec<EpisodeUser>> {
        self.lookup(|i| &i.by_user, &user_id)
    }

    pub fn find_record(
        &self,
        user_id: UserId,
        episode_id: EpisodeId,
    ) -> RepoResult<Option<EpisodeUser>> {
        Ok(self
            .lookup(|i| &i.by_user_episode, &(user_id, episode_id))?
            .into_iter()
            .next())
    }

    /// Deletes every user's record for a deleted episode.
    pub fn delete_for_episode(&self, episode_id: EpisodeId) -> RepoResult<Vec<EpisodeUser>> {
        let keys = self.lookup_keys(|i| &i.by_episode, &episode_id)?;
        self.delete_many(&keys, &())
    }

    /// Creates or updates the user's record for one episode.
    pub fn set_watched(
        &self,
        user_id: UserId,
        episode_id: EpisodeId,
        watched: bool,
    ) -> RepoResult<EpisodeUser> {
        let mut scope = self.begin_add_or_update(
            || self.find_record(user_id, episode_id),
            || EpisodeUser::new(user_id, episode_id, watched),
        )?;
        if scope.is_update() {
            scope.watched = watched;
        }
        scope.commit(&())
    }
}

pub struct GroupUserIndexes {
    pub by_user: Index<GroupUser, UserId>,
    pub by_group: Index<GroupUser, GroupId>,
    pub by_user_group: Index<GroupUser, (UserId, GroupId)>,
}

impl IndexSet<GroupUser> for GroupUserIndexes {
    fn empty() -> Self {
        Self {
            by_user: Index::single("by_user", |r: &GroupUser| r.user_id),
            by_group: Index::single("by_group", |r: &GroupUser| r.group_id),
            by_user_group: Index::single("by_user_group", |r: &GroupUser| {
                (r.user_id, r.group_id)
            }),
        }
    }

    fn insert(&mut self, entity: &GroupUser) {
        self.by_user.insert(entity);
        self.by_group.insert(entity);
        self.by_user_group.insert(entity);
    }

    fn remove(&mut self, entity: &GroupUser) {
        self.by_user.remove(entity);
        self.by_group.remove(entity);
        self.by_user_group.remove(entity);
    }

    fn clear(&mut self) {
        self.by_user.clear();
        self.by_group.clear();
        self.by_user_group.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_user.same_entries(&other.by_user)
            && self.by_group.same_entries(&other.by_group)
            && self.by_user_group.same_entries(&other.by_user_group)
    }
}

pub struct GroupUserHooks {
    library: Weak<Library>,
    create: Mutex<()>,
}

impl GroupUserHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self {
            library,
            create: Mutex::new(()),
        }
    }
}

impl MutationHooks<GroupUser> for GroupUserHooks {
    type Params = ();
    type SaveContext = ();
    type DeleteContext = ();

    fn begin_save(
        &self,
        entity: &mut GroupUser,
        _original: Option<&GroupUser>,
        _params: &(),
    ) -> HookResult<()> {
        let library = attach(&self.library, "group_users")?;
        let mut total = 0;
        let mut watched = 0;
        for member in library.groups().subtree(entity.group_id)? {
            for series in library.series().in_group(member)? {
                for episode in library.episodes().lookup_keys(|i| &i.by_series, &series.id)? {
                    total += 1;
                    let seen = library
                        .episode_users()
                        .find_record(entity.user_id, episode)?
                        .is_some_and(|record| record.watched);
                    if seen {
                        watched += 1;
                    }
                }
            }
        }
        entity.watched_count = watched;
        entity.unwatched_count = total - watched;
        Ok(())
    }

    fn end_save(&self, _entity: &GroupUser, _context: (), _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn begin_delete(&self, _entity: &GroupUser, _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn end_delete(&self, _entity: &GroupUser, _context: (), _params: &()) -> HookResult<()> {
        Ok(())
    }
}

impl GroupUserRepository {
    pub fn for_user(&self, user_id: UserId) -> RepoResult<Vec<GroupUser>> {
        self.lookup(|i| &i.by_user, &user_id)
    }

    pub fn find_record(&self, user_id: UserId, group_id: GroupId) -> RepoResult<Option<GroupUser>> {
        Ok(self
            .lookup(|i| &i.by_user_group, &(user_id, group_id))?
            .into_iter()
            .next())
    }

    /// Recomputes the user's record for `group_id` and every ancestor,
    /// creating missing records.
    pub fn refresh(
        &self,
        library: &Library,
        user_id: UserId,
        group_id: GroupId,
    ) -> RepoResult<usize> {
        let mut walk = AncestorWalk::start(group_id);
        let mut current = group_id;
        let mut refreshed = 0;
        loop {
            {
                let _create = self.hooks().create.lock();
                let scope = self.begin_add_or_update(
                    || self.find_record(user_id, current),
                    || GroupUser::new(user_id, current),
                )?;
                scope.commit(&())?;
            }
            refreshed += 1;

            let parent = library.groups().get(&current)?.and_then(|g| g.real_parent());
            let Some(parent) = parent else {
                break;
            };
            let Some(next) = walk.step(current, parent) else {
                debug!(
                    "event=group_user_walk module=library status=stopped user={user_id} group={current} trace={}",
                    walk.trace()
                );
                break;
            };
            walk = next;
            current = parent;
        }
        Ok(refreshed)
    }

    /// Re-saves every user's record for one group.
    pub fn touch_group(&self, group_id: GroupId) -> RepoResult<usize> {
        let mut touched = 0;
        for key in self.lookup_keys(|i| &i.by_group, &group_id)? {
            if self.touch(&key, &())?.is_some() {
                touched += 1;
            }
        }
        Ok(touched)
    }
}

impl Library {
    /// Group owning the episode's series.
    pub fn owning_group(&self, episode_id: EpisodeId) -> RepoResult<Option<GroupId>> {
        let Some(episode) = self.episodes().get(&episode_id)? else {
            return Ok(None);
        };
        Ok(self
            .series()
            .get(&episode.series_id)?
            .map(|series| series.group_id))
    }
}
