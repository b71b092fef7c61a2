//! Smart-filter repository: materialized membership and directory filters.
//!
//! # Invariants
//! - A filter's membership is recomputed from every group whenever its
//!   conditions or match mode change.
//! - Otherwise membership carries over from the stored filter, so saves of
//!   stale copies never roll back group changes committed meanwhile.
//! - A group save only re-evaluates filters that read a changed attribute
//!   or currently list the group. The group is read under the filter commit
//!   mutex, so the last membership write reflects the latest group state.
//! - Directory containers ("Tags", "Years", "Seasons") and their generated
//!   children are unique per name; creation is serialized.

use super::{attach, Library, LibraryError};
use crate::model::{
    ConditionType, Filter, FilterCondition, FilterId, FilterSource, GroupId, MatchMode, Season,
};
use crate::repo::{HookError, HookResult, Index, IndexSet, MutationHooks, RepoResult, Repository};
use log::info;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Weak;

pub type FilterRepository = Repository<Filter, FilterIndexes, FilterHooks>;

pub const TAGS_DIRECTORY: &str = "Tags";
pub const YEARS_DIRECTORY: &str = "Years";
pub const SEASONS_DIRECTORY: &str = "Seasons";

pub struct FilterIndexes {
    pub by_parent: Index<Filter, Option<FilterId>>,
    pub by_type: Index<Filter, ConditionType>,
    pub by_member: Index<Filter, GroupId>,
    /// Composite `(parent, name)`; exact match only.
    pub by_parent_name: Index<Filter, (Option<FilterId>, String)>,
}

impl IndexSet<Filter> for FilterIndexes {
    fn empty() -> Self {
        Self {
            by_parent: Index::single("by_parent", |f: &Filter| f.parent_id),
            by_type: Index::multi("by_type", |f: &Filter| {
                f.condition_types().into_iter().collect()
            }),
            by_member: Index::multi("by_member", |f: &Filter| {
                f.group_ids.iter().copied().collect()
            }),
            by_parent_name: Index::single("by_parent_name", |f: &Filter| {
                (f.parent_id, f.name.clone())
            }),
        }
    }

    fn insert(&mut self, entity: &Filter) {
        self.by_parent.insert(entity);
        self.by_type.insert(entity);
        self.by_member.insert(entity);
        self.by_parent_name.insert(entity);
    }

    fn remove(&mut self, entity: &Filter) {
        self.by_parent.remove(entity);
        self.by_type.remove(entity);
        self.by_member.remove(entity);
        self.by_parent_name.remove(entity);
    }

    fn clear(&mut self) {
        self.by_parent.clear();
        self.by_type.clear();
        self.by_member.clear();
        self.by_parent_name.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_parent.same_entries(&other.by_parent)
            && self.by_type.same_entries(&other.by_type)
            && self.by_member.same_entries(&other.by_member)
            && self.by_parent_name.same_entries(&other.by_parent_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterParams {
    /// Recompute membership even when the conditions did not change.
    pub recalculate: bool,
    /// Re-evaluate this one group against the filter.
    pub group: Option<GroupId>,
}

pub struct FilterHooks {
    library: Weak<Library>,
    directory: Mutex<()>,
}

impl FilterHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self {
            library,
            directory: Mutex::new(()),
        }
    }
}

impl MutationHooks<Filter> for FilterHooks {
    type Params = FilterParams;
    type SaveContext = ();
    type DeleteContext = ();

    fn begin_save(
        &self,
        entity: &mut Filter,
        original: Option<&Filter>,
        params: &FilterParams,
    ) -> HookResult<()> {
        if entity.name.trim().is_empty() {
            return Err(HookError::Rejected("filter name must not be blank".to_string()));
        }
        for condition in &entity.conditions {
            condition.validate().map_err(HookError::Rejected)?;
        }
        let previous = original.filter(|previous| {
            previous.conditions == entity.conditions && previous.match_mode == entity.match_mode
        });
        match previous {
            Some(previous) if !params.recalculate => {
                entity.group_ids = previous.group_ids.clone();
                if let Some(group_id) = params.group {
                    let library = attach(&self.library, "filters")?;
                    let member = library
                        .groups()
                        .get(&group_id)?
                        .is_some_and(|group| entity.matches(&group));
                    if member {
                        entity.group_ids.insert(group_id);
                    } else {
                        entity.group_ids.remove(&group_id);
                    }
                }
            }
            _ => {
                let library = attach(&self.library, "filters")?;
                let group_ids: BTreeSet<GroupId> = {
                    let matcher = entity.matcher();
                    library
                        .groups()
                        .find(|group| matcher.matches(group))?
                        .into_iter()
                        .map(|group| group.id)
                        .collect()
                };
                entity.group_ids = group_ids;
            }
        }
        Ok(())
    }

    fn end_save(&self, _entity: &Filter, _context: (), _params: &FilterParams) -> HookResult<()> {
        Ok(())
    }

    fn begin_delete(&self, entity: &Filter, _params: &FilterParams) -> HookResult<()> {
        let library = attach(&self.library, "filters")?;
        let children = library
            .filters()
            .lookup_keys(|i| &i.by_parent, &Some(entity.id))?;
        if !children.is_empty() {
            return Err(HookError::Rejected(format!(
                "filter {} still has {} child filter(s)",
                entity.id,
                children.len()
            )));
        }
        Ok(())
    }

    fn end_delete(&self, _entity: &Filter, _context: (), _params: &FilterParams) -> HookResult<()> {
        Ok(())
    }
}

impl FilterRepository {
    pub fn children(&self, parent: Option<FilterId>) -> RepoResult<Vec<Filter>> {
        self.lookup(|i| &i.by_parent, &parent)
    }

    pub fn containing(&self, group_id: GroupId) -> RepoResult<Vec<Filter>> {
        self.lookup(|i| &i.by_member, &group_id)
    }

    pub fn find_named(&self, parent: Option<FilterId>, name: &str) -> RepoResult<Option<Filter>> {
        Ok(self
            .lookup(|i| &i.by_parent_name, &(parent, name.to_string()))?
            .into_iter()
            .next())
    }

    /// Re-evaluates one group against the filters affected by `changed`.
    ///
    /// Returns the number of filters whose membership changed.
    pub fn update_membership(
        &self,
        group_id: GroupId,
        changed: &BTreeSet<ConditionType>,
    ) -> RepoResult<usize> {
        let mut candidates: BTreeSet<FilterId> = BTreeSet::new();
        for condition_type in changed {
            candidates.extend(self.lookup_keys(|i| &i.by_type, condition_type)?);
        }
        candidates.extend(self.lookup_keys(|i| &i.by_member, &group_id)?);
        self.reevaluate(group_id, candidates)
    }

    /// Drops a deleted group from every filter listing it.
    pub fn remove_group(&self, group_id: GroupId) -> RepoResult<usize> {
        let listing = self.lookup_keys(|i| &i.by_member, &group_id)?;
        self.reevaluate(group_id, listing)
    }

    fn reevaluate(
        &self,
        group_id: GroupId,
        filters: impl IntoIterator<Item = FilterId>,
    ) -> RepoResult<usize> {
        let params = FilterParams {
            group: Some(group_id),
            ..FilterParams::default()
        };
        let mut updated = 0;
        for filter_id in filters {
            let Some(before) = self.get(&filter_id)? else {
                continue;
            };
            let Some(after) = self.touch(&filter_id, &params)? else {
                continue;
            };
            if before.group_ids.contains(&group_id) != after.group_ids.contains(&group_id) {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Creates missing directory containers and generated children for the
    /// given facet values. Returns the number of filters created.
    pub fn ensure_directory_filters(
        &self,
        tags: &BTreeSet<String>,
        years: &BTreeSet<i32>,
        seasons: &BTreeSet<Season>,
    ) -> RepoResult<usize> {
        let _directory = self.hooks().directory.lock();
        let mut created = 0;
        created += self.ensure_children(
            TAGS_DIRECTORY,
            tags.iter()
                .map(|tag| (tag.clone(), FilterCondition::HasTag(tag.clone()))),
        )?;
        created += self.ensure_children(
            YEARS_DIRECTORY,
            years
                .iter()
                .map(|year| (year.to_string(), FilterCondition::InYear(*year))),
        )?;
        created += self.ensure_children(
            SEASONS_DIRECTORY,
            seasons
                .iter()
                .map(|season| (season.to_string(), FilterCondition::InSeason(*season))),
        )?;
        if created > 0 {
            info!("event=directory_filters module=library status=ok created={created}");
        }
        Ok(created)
    }

    fn ensure_children(
        &self,
        directory: &str,
        children: impl Iterator<Item = (String, FilterCondition)>,
    ) -> RepoResult<usize> {
        let mut children = children.peekable();
        if children.peek().is_none() {
            return Ok(0);
        }
        let params = FilterParams::default();
        let mut created = 0;
        let container = match self.find_named(None, directory)? {
            Some(existing) => existing,
            None => {
                created += 1;
                self.save(Filter::directory(directory), &params)?
            }
        };
        for (name, condition) in children {
            if self.find_named(Some(container.id), &name)?.is_some() {
                continue;
            }
            self.save(Filter::generated(container.id, name, condition), &params)?;
            created += 1;
        }
        Ok(created)
    }

    /// Replaces a user filter's conditions unless it is locked.
    pub fn edit_conditions(
        &self,
        filter_id: FilterId,
        conditions: Vec<FilterCondition>,
        match_mode: MatchMode,
    ) -> Result<Filter, LibraryError> {
        let mut scope = self
            .begin_update(&filter_id)?
            .ok_or(LibraryError::NotFound {
                kind: "filter",
                key: filter_id,
            })?;
        if scope.locked || scope.source != FilterSource::User {
            return Err(LibraryError::Locked {
                kind: "filter",
                key: filter_id,
            });
        }
        scope.conditions = conditions;
        scope.match_mode = match_mode;
        Ok(scope.commit(&FilterParams::default())?)
    }
}
