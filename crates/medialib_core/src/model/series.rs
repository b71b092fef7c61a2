//! Series record and airing seasons.

use crate::model::group::GroupId;
use crate::repo::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

pub type SeriesId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonName {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl SeasonName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Winter => "Winter",
            Self::Spring => "Spring",
            Self::Summer => "Summer",
            Self::Autumn => "Autumn",
        }
    }
}

/// One airing season, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Season {
    pub year: i32,
    pub name: SeasonName,
}

impl Season {
    pub fn new(name: SeasonName, year: i32) -> Self {
        Self { year, name }
    }
}

impl Display for Season {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name.as_str(), self.year)
    }
}

/// A catalogued series, cross-referenced to its external metadata id.
///
/// # Invariants
/// - `end_year`, when set, is not earlier than `begin_year`.
/// - `episode_count` is derived from the episodes repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub group_id: GroupId,
    pub title: String,
    /// External metadata provider id.
    pub anidb_id: i64,
    pub begin_year: Option<i32>,
    pub end_year: Option<i32>,
    pub tags: BTreeSet<String>,
    pub seasons: BTreeSet<Season>,
    pub episode_count: i64,
    pub stats_version: i64,
}

impl Series {
    pub fn new(group_id: GroupId, title: impl Into<String>, anidb_id: i64) -> Self {
        Self {
            group_id,
            title: title.into(),
            anidb_id,
            ..Self::default()
        }
    }

    /// Every calendar year the series aired in.
    pub fn years(&self) -> BTreeSet<i32> {
        match (self.begin_year, self.end_year) {
            (Some(begin), Some(end)) if end >= begin => (begin..=end).collect(),
            (Some(begin), _) => BTreeSet::from([begin]),
            (None, _) => BTreeSet::new(),
        }
    }
}

impl Entity for Series {
    type Key = SeriesId;
    type Partition = ();

    fn key(&self) -> SeriesId {
        self.id
    }

    fn set_key(&mut self, key: SeriesId) {
        self.id = key;
    }

    fn partition(&self) {}
}
