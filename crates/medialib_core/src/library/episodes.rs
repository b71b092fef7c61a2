//! Episode repository; every commit recomputes the owning series.
//! Deleting an episode also deletes every user's watched record for it.

use super::{attach, Library};
use crate::model::{Episode, EpisodeKind, SeriesId};
use crate::repo::{HookError, HookResult, Index, IndexSet, MutationHooks, RepoResult, Repository};
use std::sync::Weak;

pub type EpisodeRepository = Repository<Episode, EpisodeIndexes, EpisodeHooks>;

pub struct EpisodeIndexes {
    pub by_series: Index<Episode, SeriesId>,
    pub by_hash: Index<Episode, String>,
    /// Composite `(series, kind, number)`; exact match only.
    pub by_series_number: Index<Episode, (SeriesId, EpisodeKind, i32)>,
}

impl IndexSet<Episode> for EpisodeIndexes {
    fn empty() -> Self {
        Self {
            by_series: Index::single("by_series", |e: &Episode| e.series_id),
            by_hash: Index::multi("by_hash", |e: &Episode| e.file_hash.iter().cloned().collect()),
            by_series_number: Index::single("by_series_number", |e: &Episode| {
                (e.series_id, e.kind, e.number)
            }),
        }
    }

    fn insert(&mut self, entity: &Episode) {
        self.by_series.insert(entity);
        self.by_hash.insert(entity);
        self.by_series_number.insert(entity);
    }

    fn remove(&mut self, entity: &Episode) {
        self.by_series.remove(entity);
        self.by_hash.remove(entity);
        self.by_series_number.remove(entity);
    }

    fn clear(&mut self) {
        self.by_series.clear();
        self.by_hash.clear();
        self.by_series_number.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_series.same_entries(&other.by_series)
            && self.by_hash.same_entries(&other.by_hash)
            && self.by_series_number.same_entries(&other.by_series_number)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeParams {
    /// Defer the series recompute; the caller runs it once after a bulk
    /// import.
    pub skip_series_update: bool,
}

pub struct EpisodeHooks {
    library: Weak<Library>,
}

impl EpisodeHooks {
    pub(crate) fn new(library: Weak<Library>) -> Self {
        Self { library }
    }

    fn recompute(&self, series: &[SeriesId]) -> HookResult<()> {
        let library = attach(&self.library, "episodes")?;
        for series_id in series {
            library.series().recompute(*series_id)?;
        }
        Ok(())
    }
}

impl MutationHooks<Episode> for EpisodeHooks {
    type Params = EpisodeParams;
    /// Series the episode belonged to before a move.
    type SaveContext = Option<SeriesId>;
    type DeleteContext = ();

    fn begin_save(
        &self,
        entity: &mut Episode,
        original: Option<&Episode>,
        _params: &EpisodeParams,
    ) -> HookResult<Option<SeriesId>> {
        let library = attach(&self.library, "episodes")?;
        if library.series().get(&entity.series_id)?.is_none() {
            return Err(HookError::Rejected(format!(
                "series {} does not exist",
                entity.series_id
            )));
        }
        if let Some(hash) = &entity.file_hash {
            entity.file_hash = Some(hash.trim().to_uppercase()).filter(|hash| !hash.is_empty());
        }
        Ok(original
            .map(|previous| previous.series_id)
            .filter(|previous| *previous != entity.series_id))
    }

    fn end_save(
        &self,
        entity: &Episode,
        previous: Option<SeriesId>,
        params: &EpisodeParams,
    ) -> HookResult<()> {
        if params.skip_series_update {
            return Ok(());
        }
        let mut touched = vec![entity.series_id];
        touched.extend(previous);
        self.recompute(&touched)
    }

    fn begin_delete(&self, _entity: &Episode, _params: &EpisodeParams) -> HookResult<()> {
        Ok(())
    }

    fn end_delete(&self, entity: &Episode, _context: (), params: &EpisodeParams) -> HookResult<()> {
        let library = attach(&self.library, "episodes")?;
        library.episode_users().delete_for_episode(entity.id)?;
        if params.skip_series_update {
            return Ok(());
        }
        self.recompute(&[entity.series_id])
    }
}

impl EpisodeRepository {
    pub fn for_series(&self, series_id: SeriesId) -> RepoResult<Vec<Episode>> {
        self.lookup(|i| &i.by_series, &series_id)
    }

    pub fn count_for_series(&self, series_id: SeriesId) -> RepoResult<i64> {
        let keys = self.lookup_keys(|i| &i.by_series, &series_id)?;
        Ok(keys.len() as i64)
    }

    /// Episodes backed by the file with this content hash.
    pub fn by_file_hash(&self, hash: &str) -> RepoResult<Vec<Episode>> {
        self.lookup(|i| &i.by_hash, &hash.trim().to_uppercase())
    }

    pub fn find_number(
        &self,
        series_id: SeriesId,
        kind: EpisodeKind,
        number: i32,
    ) -> RepoResult<Option<Episode>> {
        Ok(self
            .lookup(|i| &i.by_series_number, &(series_id, kind, number))?
            .into_iter()
            .next())
    }
}
