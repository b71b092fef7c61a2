#![allow(dead_code)]

use medialib_core::repo::{
    CacheMode, Entity, HookError, HookResult, Index, IndexSet, MutationHooks, Repository,
};
use medialib_core::MemoryStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Minimal entity: a track on an album, owned by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub id: i64,
    pub owner: i64,
    pub album: i64,
    pub title: String,
    pub tags: Vec<String>,
}

impl Track {
    pub fn new(owner: i64, album: i64, title: &str) -> Self {
        Self {
            id: 0,
            owner,
            album,
            title: title.to_string(),
            tags: Vec::new(),
        }
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }
}

impl Entity for Track {
    type Key = i64;
    type Partition = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn partition(&self) -> i64 {
        self.owner
    }
}

pub struct TrackIndexes {
    pub by_album: Index<Track, i64>,
    pub by_tag: Index<Track, String>,
}

impl IndexSet<Track> for TrackIndexes {
    fn empty() -> Self {
        Self {
            by_album: Index::single("by_album", |t: &Track| t.album),
            by_tag: Index::multi("by_tag", |t: &Track| t.tags.clone()),
        }
    }

    fn insert(&mut self, entity: &Track) {
        self.by_album.insert(entity);
        self.by_tag.insert(entity);
    }

    fn remove(&mut self, entity: &Track) {
        self.by_album.remove(entity);
        self.by_tag.remove(entity);
    }

    fn clear(&mut self) {
        self.by_album.clear();
        self.by_tag.clear();
    }

    fn same_entries(&self, other: &Self) -> bool {
        self.by_album.same_entries(&other.by_album) && self.by_tag.same_entries(&other.by_tag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackParams {
    /// Makes the End hook fail after the commit.
    pub fail_end: bool,
}

/// Records every hook call together with the store's write count at that
/// moment.
pub struct TrackHooks {
    store: Arc<MemoryStore<Track>>,
    events: Mutex<Vec<String>>,
}

impl TrackHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn take_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl MutationHooks<Track> for TrackHooks {
    type Params = TrackParams;
    type SaveContext = usize;
    type DeleteContext = ();

    fn begin_save(
        &self,
        entity: &mut Track,
        _original: Option<&Track>,
        _params: &TrackParams,
    ) -> HookResult<usize> {
        if entity.title.trim().is_empty() {
            return Err(HookError::Rejected("title must not be blank".to_string()));
        }
        entity.title = entity.title.trim().to_string();
        let writes = self.store.write_count();
        self.record(format!("begin_save {} writes={writes}", entity.title));
        Ok(writes)
    }

    fn end_save(&self, entity: &Track, _context: usize, params: &TrackParams) -> HookResult<()> {
        self.record(format!(
            "end_save {} writes={}",
            entity.id,
            self.store.write_count()
        ));
        if params.fail_end {
            return Err(HookError::Rejected("end hook failure".to_string()));
        }
        Ok(())
    }

    fn begin_delete(&self, entity: &Track, _params: &TrackParams) -> HookResult<()> {
        if entity.tags.iter().any(|tag| tag == "pinned") {
            return Err(HookError::Rejected("pinned tracks cannot be deleted".to_string()));
        }
        self.record(format!("begin_delete {}", entity.id));
        Ok(())
    }

    fn end_delete(&self, entity: &Track, _context: (), params: &TrackParams) -> HookResult<()> {
        self.record(format!("end_delete {}", entity.id));
        if params.fail_end {
            return Err(HookError::Rejected("end hook failure".to_string()));
        }
        Ok(())
    }
}

pub type TrackRepository = Repository<Track, TrackIndexes, TrackHooks>;

/// Repository over a fresh store seeded with `rows`; not yet populated.
pub fn track_repo_with(
    mode: CacheMode,
    rows: Vec<Track>,
) -> (Arc<MemoryStore<Track>>, TrackRepository) {
    let store = Arc::new(MemoryStore::with_rows("tracks", rows));
    let hooks = TrackHooks {
        store: Arc::clone(&store),
        events: Mutex::new(Vec::new()),
    };
    let repo: TrackRepository = Repository::new("tracks", store.clone(), mode, hooks);
    (store, repo)
}

/// Empty, populated, cached repository.
pub fn track_repo() -> (Arc<MemoryStore<Track>>, TrackRepository) {
    let (store, repo) = track_repo_with(CacheMode::Cached, Vec::new());
    repo.populate().unwrap();
    (store, repo)
}

pub fn params() -> TrackParams {
    TrackParams::default()
}

pub fn seeded_rows() -> Vec<Track> {
    vec![
        Track {
            id: 1,
            ..Track::new(10, 100, "Intro").tagged(&["ambient"])
        },
        Track {
            id: 2,
            ..Track::new(10, 100, "Theme").tagged(&["ambient", "vocal"])
        },
        Track {
            id: 3,
            ..Track::new(20, 200, "Outro")
        },
    ]
}
