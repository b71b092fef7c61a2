//! Explicit registry of the library repositories.
//!
//! # Responsibility
//! - Own exactly one repository per record kind and hand out references.
//! - Wire cross-repository cascades through weak back-references, with the
//!   cascade graph validated before any repository is built.
//! - Bootstrap from configuration and repair stale aggregates.
//!
//! # Invariants
//! - Hooks reach other repositories only through this registry.
//! - Cascade edges form a DAG apart from the `groups -> groups` parent walk.

mod episodes;
mod filters;
mod groups;
mod series;
mod stats;
mod users;

pub use episodes::{EpisodeHooks, EpisodeIndexes, EpisodeParams, EpisodeRepository};
pub use filters::{
    FilterHooks, FilterIndexes, FilterParams, FilterRepository, SEASONS_DIRECTORY, TAGS_DIRECTORY,
    YEARS_DIRECTORY,
};
pub use groups::{GroupHooks, GroupIndexes, GroupParams, GroupRepository};
pub use series::{SeriesHooks, SeriesIndexes, SeriesParams, SeriesRepository};
pub use stats::LibraryStats;
pub use users::{
    EpisodeUserHooks, EpisodeUserIndexes, EpisodeUserRepository, GroupUserHooks,
    GroupUserIndexes, GroupUserRepository,
};

use crate::config::{CacheConfig, ConfigError, DatabaseConfig, LibraryConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging;
use crate::model::{Episode, EpisodeUser, Filter, Group, GroupUser, Series, STATS_VERSION};
use crate::repo::{
    CascadeGraph, CascadeGraphError, Entity, HookError, IndexSet, MutationHooks, RepoError,
    Repository, RepositoryDiagnostics,
};
use crate::store::{shared_connection, MemoryStore, SharedConnection, SqliteStore, Store};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};

pub const GROUPS: &str = "groups";
pub const SERIES: &str = "series";
pub const EPISODES: &str = "episodes";
pub const FILTERS: &str = "filters";
pub const EPISODE_USERS: &str = "episode_users";
pub const GROUP_USERS: &str = "group_users";

/// Errors from library bootstrap and domain-level operations.
#[derive(Debug)]
pub enum LibraryError {
    Config(ConfigError),
    Db(DbError),
    Logging(String),
    Graph(CascadeGraphError),
    Repo(RepoError),
    /// Record is locked against edits.
    Locked { kind: &'static str, key: i64 },
    NotFound { kind: &'static str, key: i64 },
}

impl Display for LibraryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Logging(message) => write!(f, "logging bootstrap failed: {message}"),
            Self::Graph(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Locked { kind, key } => write!(f, "{kind} {key} is locked"),
            Self::NotFound { kind, key } => write!(f, "{kind} {key} not found"),
        }
    }
}

impl Error for LibraryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Graph(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Logging(_) | Self::Locked { .. } | Self::NotFound { .. } => None,
        }
    }
}

impl From<ConfigError> for LibraryError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for LibraryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<CascadeGraphError> for LibraryError {
    fn from(value: CascadeGraphError) -> Self {
        Self::Graph(value)
    }
}

impl From<RepoError> for LibraryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Durable stores backing one library.
pub struct LibraryStores {
    pub groups: Arc<dyn Store<Group>>,
    pub series: Arc<dyn Store<Series>>,
    pub episodes: Arc<dyn Store<Episode>>,
    pub filters: Arc<dyn Store<Filter>>,
    pub episode_users: Arc<dyn Store<EpisodeUser>>,
    pub group_users: Arc<dyn Store<GroupUser>>,
}

impl LibraryStores {
    /// SQLite tables sharing one migrated connection.
    pub fn sqlite(conn: &SharedConnection) -> Self {
        Self {
            groups: Arc::new(SqliteStore::<Group>::new(Arc::clone(conn))),
            series: Arc::new(SqliteStore::<Series>::new(Arc::clone(conn))),
            episodes: Arc::new(SqliteStore::<Episode>::new(Arc::clone(conn))),
            filters: Arc::new(SqliteStore::<Filter>::new(Arc::clone(conn))),
            episode_users: Arc::new(SqliteStore::<EpisodeUser>::new(Arc::clone(conn))),
            group_users: Arc::new(SqliteStore::<GroupUser>::new(Arc::clone(conn))),
        }
    }

    pub fn memory() -> Self {
        Self {
            groups: Arc::new(MemoryStore::<Group>::new(GROUPS)),
            series: Arc::new(MemoryStore::<Series>::new(SERIES)),
            episodes: Arc::new(MemoryStore::<Episode>::new(EPISODES)),
            filters: Arc::new(MemoryStore::<Filter>::new(FILTERS)),
            episode_users: Arc::new(MemoryStore::<EpisodeUser>::new(EPISODE_USERS)),
            group_users: Arc::new(MemoryStore::<GroupUser>::new(GROUP_USERS)),
        }
    }
}

/// Records touched by [`Library::reconcile`] whose stored value changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub series: usize,
    pub groups: usize,
    pub filters: usize,
    pub group_users: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.series + self.groups + self.filters + self.group_users
    }
}

pub struct Library {
    groups: GroupRepository,
    series: SeriesRepository,
    episodes: EpisodeRepository,
    filters: FilterRepository,
    episode_users: EpisodeUserRepository,
    group_users: GroupUserRepository,
    cascades: CascadeGraph,
}

impl Library {
    /// Declared cascade edges between the library repositories.
    pub fn cascade_graph_definition() -> CascadeGraph {
        CascadeGraph::new(&[GROUPS, SERIES, EPISODES, FILTERS, EPISODE_USERS, GROUP_USERS])
            .edge(EPISODES, SERIES)
            .edge(SERIES, GROUPS)
            .edge(SERIES, FILTERS)
            .edge(GROUPS, GROUPS)
            .edge(GROUPS, FILTERS)
            .edge(GROUPS, GROUP_USERS)
            .edge(EPISODES, EPISODE_USERS)
            .edge(EPISODE_USERS, GROUP_USERS)
    }

    /// Opens the configured database, populates caches and repairs stale
    /// aggregates.
    pub fn open(config: &LibraryConfig) -> Result<Arc<Self>, LibraryError> {
        config.validate()?;
        if let Some(logging) = &config.logging {
            logging::init_from_config(logging).map_err(LibraryError::Logging)?;
        }
        info!("event=library_open module=library status=start");

        let conn = match &config.database {
            DatabaseConfig::File { path } => open_db(path),
            DatabaseConfig::Memory => open_db_in_memory(),
        }
        .map_err(|err| {
            error!("event=library_open module=library status=error error={err}");
            LibraryError::Db(err)
        })?;
        let conn = shared_connection(conn);
        let library = Self::with_stores(LibraryStores::sqlite(&conn), &config.cache)?;
        library.populate()?;
        let refreshed = library.refresh_outdated()?;
        if config.reconcile_on_open {
            library.reconcile()?;
        }
        info!("event=library_open module=library status=ok refreshed={refreshed}");
        Ok(library)
    }

    /// Builds the registry over caller-provided stores without populating.
    pub fn with_stores(
        stores: LibraryStores,
        cache: &CacheConfig,
    ) -> Result<Arc<Self>, LibraryError> {
        let cascades = Self::cascade_graph_definition();
        cascades.validate()?;
        let LibraryStores {
            groups,
            series,
            episodes,
            filters,
            episode_users,
            group_users,
        } = stores;

        Ok(Arc::new_cyclic(|library: &Weak<Self>| Self {
            groups: Repository::new(
                GROUPS,
                groups,
                cache.mode_for(GROUPS),
                GroupHooks::new(library.clone()),
            ),
            series: Repository::new(
                SERIES,
                series,
                cache.mode_for(SERIES),
                SeriesHooks::new(library.clone()),
            ),
            episodes: Repository::new(
                EPISODES,
                episodes,
                cache.mode_for(EPISODES),
                EpisodeHooks::new(library.clone()),
            ),
            filters: Repository::new(
                FILTERS,
                filters,
                cache.mode_for(FILTERS),
                FilterHooks::new(library.clone()),
            ),
            episode_users: Repository::new(
                EPISODE_USERS,
                episode_users,
                cache.mode_for(EPISODE_USERS),
                EpisodeUserHooks::new(library.clone()),
            ),
            group_users: Repository::new(
                GROUP_USERS,
                group_users,
                cache.mode_for(GROUP_USERS),
                GroupUserHooks::new(library.clone()),
            ),
            cascades,
        }))
    }

    /// In-memory stores, every repository cached and populated.
    pub fn in_memory() -> Result<Arc<Self>, LibraryError> {
        let library = Self::with_stores(LibraryStores::memory(), &CacheConfig::default())?;
        library.populate()?;
        Ok(library)
    }

    pub fn groups(&self) -> &GroupRepository {
        &self.groups
    }

    pub fn series(&self) -> &SeriesRepository {
        &self.series
    }

    pub fn episodes(&self) -> &EpisodeRepository {
        &self.episodes
    }

    pub fn filters(&self) -> &FilterRepository {
        &self.filters
    }

    pub fn episode_users(&self) -> &EpisodeUserRepository {
        &self.episode_users
    }

    pub fn group_users(&self) -> &GroupUserRepository {
        &self.group_users
    }

    pub fn cascade_graph(&self) -> &CascadeGraph {
        &self.cascades
    }

    /// Loads every cached repository, leaves first.
    pub fn populate(&self) -> Result<(), LibraryError> {
        self.episodes.populate()?;
        self.series.populate()?;
        self.groups.populate()?;
        self.filters.populate()?;
        self.episode_users.populate()?;
        self.group_users.populate()?;
        Ok(())
    }

    pub fn diagnostics(&self) -> Vec<RepositoryDiagnostics> {
        vec![
            self.groups.diagnostics(),
            self.series.diagnostics(),
            self.episodes.diagnostics(),
            self.filters.diagnostics(),
            self.episode_users.diagnostics(),
            self.group_users.diagnostics(),
        ]
    }

    /// Recomputes series and groups persisted by an older aggregate layout.
    pub fn refresh_outdated(&self) -> Result<usize, LibraryError> {
        let mut refreshed = 0;
        let series_params = SeriesParams {
            skip_group_update: true,
        };
        for series in self.series.find(|s| s.stats_version < STATS_VERSION)? {
            self.series.touch(&series.id, &series_params)?;
            refreshed += 1;
        }
        let group_params = GroupParams {
            skip_parent_update: true,
            ..GroupParams::default()
        };
        for group in self.groups.find(|g| g.stats_version < STATS_VERSION)? {
            self.groups.touch(&group.id, &group_params)?;
            refreshed += 1;
        }
        if refreshed > 0 {
            info!(
                "event=library_refresh_outdated module=library status=ok count={refreshed} version={STATS_VERSION}"
            );
        }
        Ok(refreshed)
    }

    /// Recomputes every derived aggregate from current state.
    ///
    /// Repairs staleness left by cascades that failed or never ran (process
    /// exit between a commit and its End hook).
    pub fn reconcile(&self) -> Result<ReconcileReport, LibraryError> {
        info!("event=library_reconcile module=library status=start");
        let mut report = ReconcileReport::default();

        let series_params = SeriesParams {
            skip_group_update: true,
        };
        report.series = touch_all(&self.series, &series_params)?;

        let group_params = GroupParams {
            skip_parent_update: true,
            ..GroupParams::default()
        };
        report.groups = touch_all(&self.groups, &group_params)?;

        let filter_params = FilterParams {
            recalculate: true,
            ..FilterParams::default()
        };
        report.filters = touch_all(&self.filters, &filter_params)?;

        report.group_users = touch_all(&self.group_users, &())?;

        info!(
            "event=library_reconcile module=library status=ok series={} groups={} filters={} group_users={}",
            report.series, report.groups, report.filters, report.group_users
        );
        Ok(report)
    }

    /// Groups currently materialized as members of a filter.
    pub fn filter_groups(&self, filter_id: i64) -> Result<Vec<Group>, LibraryError> {
        let filter = self.filters.get(&filter_id)?.ok_or(LibraryError::NotFound {
            kind: "filter",
            key: filter_id,
        })?;
        let keys: Vec<i64> = filter.group_ids.iter().copied().collect();
        Ok(self.groups.get_many(&keys)?)
    }
}

/// Touches every record and counts those whose stored value changed.
fn touch_all<T, I, H>(repo: &Repository<T, I, H>, params: &H::Params) -> Result<usize, RepoError>
where
    T: Entity,
    I: IndexSet<T>,
    H: MutationHooks<T>,
{
    let mut changed = 0;
    for before in repo.get_all()? {
        if let Some(after) = repo.touch(&before.key(), params)? {
            if after != before {
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// Upgrades a hook's weak registry reference.
fn attach(library: &Weak<Library>, repository: &'static str) -> Result<Arc<Library>, HookError> {
    library.upgrade().ok_or(HookError::Detached(repository))
}
