//! Media-library domain records.
//!
//! # Responsibility
//! - Define the record kinds the library repositories manage.
//! - Keep relationships as key references, never live object links.
//!
//! # Invariants
//! - Keys `<= 0` mean "not yet persisted"; the store assigns real keys.
//! - Aggregate fields (`Group::stats`, `Series::episode_count`, per-user
//!   counters) are derived state, recomputed by repository hooks.

pub mod episode;
pub mod filter;
pub mod group;
pub mod series;
pub mod user;

pub use episode::{Episode, EpisodeId, EpisodeKind};
pub use filter::{
    ConditionType, Filter, FilterCondition, FilterId, FilterMatcher, FilterSource, MatchMode,
};
pub use group::{Group, GroupId, GroupStats};
pub use series::{Season, SeasonName, Series, SeriesId};
pub use user::{EpisodeUser, GroupUser, UserId};

/// Version of the aggregate layout written by the current hooks.
///
/// Records persisted with an older version are recomputed on open.
pub const STATS_VERSION: i64 = 1;
