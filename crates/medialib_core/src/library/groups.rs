//! Group repository: subtree aggregates and the recursive parent walk.
//!
//! # Invariants
//! - `Group::stats` is recomputed inside `begin_save` from the current
//!   series cache, so concurrent recomputes converge.
//! - Parent recomputes walk upward with an [`AncestorWalk`]; a self-parented
//!   group or a parent cycle stops the walk instead of recursing.

use super::{attach, Library, LibraryError};
use crate::model::{ConditionType, Group, GroupId, GroupStats, GroupUser, STATS_VERSION};
use crate::repo::{
    AncestorWalk, HookError, HookResult, Index, IndexSet, MutationHooks, RepoResult, Repository,
};
use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::sync::Weak;

pub type GroupRepository = Repository<Group, GroupIndexes, GroupHooks>;

pub struct GroupIndexes {
    pub by_parent: Index<Group, Option<GroupId>>,
    pub by_name: Index<Group, String>,
}

impl IndexSet<Group> for GroupIndexes {
    fn empty() -> Self {
        Self {
            by_parent: Index::single("by_parent", |g: &Group| g.parent_id),
            by_name: Index::single("by_name", |g: &Group| g.name.to_lowercase()),
        }
    }

    fn insert(&mut self, entity: &Group) {
        self.by_parent.insert(entity);
        self.by_name.insert(entity);
    }

    fn remove(&mut self, entity: &Group) {
        self.by_parent.remove(entity);
        self.by_name.remove(entity);
    }

    fn clear(&mut self) {
        self.by_parent.clear();
        self.by_name.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_parent.same_entries(&other.by_parent) && self.by_name.same_entries(&other.by_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupParams {
    /// Walk the originating commit is part of; `None` starts a new one.
    pub walk: Option<AncestorWalk<GroupId>>,
    /// Recompute this group only, leaving ancestors alone.
    pub skip_parent_update: bool,
}

pub struct GroupSaveContext {
    previous_parent: Option<GroupId>,
    changed: BTreeSet<ConditionType>,
}

pub struct GroupDeleteContext {
    parent: Option<GroupId>,
}

pub struct GroupHooks {
    library: Weak<Library>,
}

impl GroupHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self { library }
    }

    fn recompute_parent(
        &self,
        library: &Library,
        group: &Group,
        parent: GroupId,
        params: &GroupParams,
    ) -> HookResult<()> {
        let walk = params
            .walk
            .clone()
            .unwrap_or_else(|| AncestorWalk::start(group.id));
        let Some(next) = walk.step(group.id, parent) else {
            debug!(
                "event=group_walk module=library status=stopped group={} parent={parent} trace={} depth={}",
                group.id,
                walk.trace(),
                walk.depth()
            );
            return Ok(());
        };
        let params = GroupParams {
            walk: Some(next),
            skip_parent_update: false,
        };
        library.groups().touch(&parent, &params)?;
        Ok(())
    }
}

impl MutationHooks<Group> for GroupHooks {
    type Params = GroupParams;
    type SaveContext = GroupSaveContext;
    type DeleteContext = GroupDeleteContext;

    fn begin_save(
        &self,
        entity: &mut Group,
        original: Option<&Group>,
        _params: &GroupParams,
    ) -> HookResult<GroupSaveContext> {
        let library = attach(&self.library, "groups")?;
        if entity.name.trim().is_empty() {
            return Err(HookError::Rejected("group name must not be blank".to_string()));
        }
        if let Some(parent) = entity.real_parent() {
            if library.groups().get(&parent)?.is_none() {
                return Err(HookError::Rejected(format!(
                    "parent group {parent} does not exist"
                )));
            }
        }

        entity.stats = library.groups().compute_stats(library.as_ref(), entity.id)?;
        entity.stats_version = STATS_VERSION;

        let changed = match original {
            Some(previous) => changed_condition_types(previous, entity),
            None => all_condition_types(),
        };
        Ok(GroupSaveContext {
            previous_parent: original
                .and_then(Group::real_parent)
                .filter(|previous| Some(*previous) != entity.real_parent()),
            changed,
        })
    }

    fn end_save(
        &self,
        entity: &Group,
        context: GroupSaveContext,
        params: &GroupParams,
    ) -> HookResult<()> {
        let library = attach(&self.library, "groups")?;
        let facets = [ConditionType::Tag, ConditionType::Year, ConditionType::Season];
        if facets.iter().any(|facet| context.changed.contains(facet)) {
            library.filters().ensure_directory_filters(
                &entity.stats.tags,
                &entity.stats.years,
                &entity.stats.seasons,
            )?;
        }
        if !context.changed.is_empty() {
            library.filters().update_membership(entity.id, &context.changed)?;
        }
        if context.changed.contains(&ConditionType::EpisodeCount) {
            library.group_users().touch_group(entity.id)?;
        }

        if params.skip_parent_update {
            return Ok(());
        }
        if let Some(parent) = entity.real_parent() {
            self.recompute_parent(library.as_ref(), entity, parent, params)?;
        }
        if let Some(previous) = context.previous_parent {
            let fresh = GroupParams::default();
            self.recompute_parent(library.as_ref(), entity, previous, &fresh)?;
        }
        Ok(())
    }

    fn begin_delete(
        &self,
        entity: &Group,
        _params: &GroupParams,
    ) -> HookResult<GroupDeleteContext> {
        let library = attach(&self.library, "groups")?;
        let children = library.groups().children(entity.id)?;
        if !children.is_empty() {
            return Err(HookError::Rejected(format!(
                "group {} still has {} child group(s)",
                entity.id,
                children.len()
            )));
        }
        let series = library
            .series()
            .lookup_keys(|i| &i.by_group, &entity.id)?;
        if !series.is_empty() {
            return Err(HookError::Rejected(format!(
                "group {} still holds {} series",
                entity.id,
                series.len()
            )));
        }
        Ok(GroupDeleteContext {
            parent: entity.real_parent(),
        })
    }

    fn end_delete(
        &self,
        entity: &Group,
        context: GroupDeleteContext,
        _params: &GroupParams,
    ) -> HookResult<()> {
        let library = attach(&self.library, "groups")?;
        library.filters().remove_group(entity.id)?;
        let group_id = entity.id;
        library
            .group_users()
            .find_and_delete(|record: &GroupUser| record.group_id == group_id, &())?;
        if let Some(parent) = context.parent {
            library.groups().touch(&parent, &GroupParams::default())?;
        }
        Ok(())
    }
}

impl GroupRepository {
    /// Direct children, excluding a self-parented group.
    pub fn children(&self, group_id: GroupId) -> RepoResult<Vec<Group>> {
        Ok(self
            .lookup(|i| &i.by_parent, &Some(group_id))?
            .into_iter()
            .filter(|child| child.id != group_id)
            .collect())
    }

    pub fn top_level(&self) -> RepoResult<Vec<Group>> {
        self.lookup(|i| &i.by_parent, &None)
    }

    pub fn find_by_name(&self, name: &str) -> RepoResult<Vec<Group>> {
        self.lookup(|i| &i.by_name, &name.to_lowercase())
    }

    /// Every group below and including `root`, each listed once even when
    /// parent links are cyclic.
    pub fn subtree(&self, root: GroupId) -> RepoResult<Vec<GroupId>> {
        let mut visited = HashSet::from([root]);
        let mut ordered = vec![root];
        let mut cursor = 0;
        while cursor < ordered.len() {
            let current = ordered[cursor];
            cursor += 1;
            for child in self.lookup_keys(|i| &i.by_parent, &Some(current))? {
                if visited.insert(child) {
                    ordered.push(child);
                }
            }
        }
        Ok(ordered)
    }

    /// Ancestors from the direct parent upward, stopping at a self-parent
    /// or the first revisited group.
    pub fn ancestors(&self, group_id: GroupId) -> RepoResult<Vec<GroupId>> {
        let mut walk = AncestorWalk::start(group_id);
        let mut ancestors = Vec::new();
        let mut current = group_id;
        while let Some(parent) = self.get(&current)?.and_then(|g| g.real_parent()) {
            let Some(next) = walk.step(current, parent) else {
                break;
            };
            walk = next;
            ancestors.push(parent);
            current = parent;
        }
        Ok(ancestors)
    }

    /// Aggregates every series in the subtree rooted at `group_id`.
    pub fn compute_stats(&self, library: &Library, group_id: GroupId) -> RepoResult<GroupStats> {
        let mut stats = GroupStats::default();
        if group_id <= 0 {
            return Ok(stats);
        }
        for member in self.subtree(group_id)? {
            for series in library.series().lookup(|i| &i.by_group, &member)? {
                stats.series_count += 1;
                stats.episode_count += series.episode_count;
                stats.years.extend(series.years());
                stats.tags.extend(series.tags.iter().cloned());
                stats.seasons.extend(series.seasons.iter().copied());
            }
        }
        Ok(stats)
    }

    /// Renames a group unless it is locked.
    pub fn rename(&self, group_id: GroupId, name: &str) -> Result<Group, LibraryError> {
        let group = self.get(&group_id)?.ok_or(LibraryError::NotFound {
            kind: "group",
            key: group_id,
        })?;
        if group.locked {
            return Err(LibraryError::Locked {
                kind: "group",
                key: group_id,
            });
        }
        let mut scope = self.begin_update_entity(&group);
        scope.name = name.trim().to_string();
        Ok(scope.commit(&GroupParams::default())?)
    }
}

fn all_condition_types() -> BTreeSet<ConditionType> {
    BTreeSet::from([
        ConditionType::Tag,
        ConditionType::Year,
        ConditionType::Season,
        ConditionType::EpisodeCount,
        ConditionType::Title,
    ])
}

fn changed_condition_types(previous: &Group, current: &Group) -> BTreeSet<ConditionType> {
    let mut changed = BTreeSet::new();
    if previous.stats.tags != current.stats.tags {
        changed.insert(ConditionType::Tag);
    }
    if previous.stats.years != current.stats.years {
        changed.insert(ConditionType::Year);
    }
    if previous.stats.seasons != current.stats.seasons {
        changed.insert(ConditionType::Season);
    }
    if previous.stats.episode_count != current.stats.episode_count {
        changed.insert(ConditionType::EpisodeCount);
    }
    if previous.name != current.name {
        changed.insert(ConditionType::Title);
    }
    changed
}
