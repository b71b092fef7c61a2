//! Series repository: episode count aggregate and group cascades.

use super::{attach, GroupParams, Library};
use crate::model::{GroupId, Series, SeriesId, STATS_VERSION};
use crate::repo::{HookError, HookResult, Index, IndexSet, MutationHooks, RepoResult, Repository};
use std::sync::Weak;

pub type SeriesRepository = Repository<Series, SeriesIndexes, SeriesHooks>;

pub struct SeriesIndexes {
    pub by_group: Index<Series, GroupId>,
    pub by_anidb: Index<Series, i64>,
    pub by_tag: Index<Series, String>,
    pub by_year: Index<Series, i32>,
}

impl IndexSet<Series> for SeriesIndexes {
    fn empty() -> Self {
        Self {
            by_group: Index::single("by_group", |s: &Series| s.group_id),
            by_anidb: Index::single("by_anidb", |s: &Series| s.anidb_id),
            by_tag: Index::multi("by_tag", |s: &Series| s.tags.iter().cloned().collect()),
            by_year: Index::multi("by_year", |s: &Series| s.years().into_iter().collect()),
        }
    }

    fn insert(&mut self, entity: &Series) {
        self.by_group.insert(entity);
        self.by_anidb.insert(entity);
        self.by_tag.insert(entity);
        self.by_year.insert(entity);
    }

    fn remove(&mut self, entity: &Series) {
        self.by_group.remove(entity);
        self.by_anidb.remove(entity);
        self.by_tag.remove(entity);
        self.by_year.remove(entity);
    }

    fn clear(&mut self) {
        self.by_group.clear();
        self.by_anidb.clear();
        self.by_tag.clear();
        self.by_year.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_group.same_entries(&other.by_group)
            && self.by_anidb.same_entries(&other.by_anidb)
            && self.by_tag.same_entries(&other.by_tag)
            && self.by_year.same_entries(&other.by_year)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeriesParams {
    /// Leave the owning group's aggregate alone (bulk repair sweeps).
    pub skip_group_update: bool,
}

pub struct SeriesSaveContext {
    previous_group: Option<GroupId>,
    facets_changed: bool,
}

pub struct SeriesHooks {
    library: Weak<Library>,
}

impl SeriesHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self { library }
    }
}

impl MutationHooks<Series> for SeriesHooks {
    type Params = SeriesParams;
    type SaveContext = SeriesSaveContext;
    type DeleteContext = GroupId;

    fn begin_save(
        &self,
        entity: &mut Series,
        original: Option<&Series>,
        _params: &SeriesParams,
    ) -> HookResult<SeriesSaveContext> {
        let library = attach(&self.library, "series")?;
        if library.groups().get(&entity.group_id)?.is_none() {
            return Err(HookError::Rejected(format!(
                "group {} does not exist",
                entity.group_id
            )));
        }
        if let (Some(begin), Some(end)) = (entity.begin_year, entity.end_year) {
            if end < begin {
                return Err(HookError::Rejected(format!(
                    "end year {end} precedes begin year {begin}"
                )));
            }
        }

        entity.episode_count = library.episodes().count_for_series(entity.id)?;
        entity.stats_version = STATS_VERSION;

        let facets_changed = original.map_or(true, |previous| {
            previous.tags != entity.tags
                || previous.seasons != entity.seasons
                || previous.years() != entity.years()
        });
        Ok(SeriesSaveContext {
            previous_group: original
                .map(|previous| previous.group_id)
                .filter(|previous| *previous != entity.group_id),
            facets_changed,
        })
    }

    fn end_save(
        &self,
        entity: &Series,
        context: SeriesSaveContext,
        params: &SeriesParams,
    ) -> HookResult<()> {
        let library = attach(&self.library, "series")?;
        if context.facets_changed {
            library.filters().ensure_directory_filters(
                &entity.tags,
                &entity.years(),
                &entity.seasons,
            )?;
        }
        if params.skip_group_update {
            return Ok(());
        }
        library
            .groups()
            .touch(&entity.group_id, &GroupParams::default())?;
        if let Some(previous) = context.previous_group {
            library.groups().touch(&previous, &GroupParams::default())?;
        }
        Ok(())
    }

    fn begin_delete(&self, entity: &Series, _params: &SeriesParams) -> HookResult<GroupId> {
        let library = attach(&self.library, "series")?;
        let remaining = library.episodes().count_for_series(entity.id)?;
        if remaining > 0 {
            return Err(HookError::Rejected(format!(
                "series {} still has {remaining} episode(s)",
                entity.id
            )));
        }
        Ok(entity.group_id)
    }

    fn end_delete(
        &self,
        _entity: &Series,
        group_id: GroupId,
        params: &SeriesParams,
    ) -> HookResult<()> {
        if params.skip_group_update {
            return Ok(());
        }
        let library = attach(&self.library, "series")?;
        library.groups().touch(&group_id, &GroupParams::default())?;
        Ok(())
    }
}

impl SeriesRepository {
    pub fn in_group(&self, group_id: GroupId) -> RepoResult<Vec<Series>> {
        self.lookup(|i| &i.by_group, &group_id)
    }

    pub fn by_anidb_id(&self, anidb_id: i64) -> RepoResult<Option<Series>> {
        Ok(self.lookup(|i| &i.by_anidb, &anidb_id)?.into_iter().next())
    }

    pub fn with_tag(&self, tag: &str) -> RepoResult<Vec<Series>> {
        self.lookup(|i| &i.by_tag, &tag.to_string())
    }

    pub fn aired_in(&self, year: i32) -> RepoResult<Vec<Series>> {
        self.lookup(|i| &i.by_year, &year)
    }

    /// Recomputes the episode count, cascading into the owning group.
    ///
    /// `Ok(None)` when the series no longer exists.
    pub fn recompute(&self, series_id: SeriesId) -> RepoResult<Option<Series>> {
        self.touch(&series_id, &SeriesParams::default())
    }
}
