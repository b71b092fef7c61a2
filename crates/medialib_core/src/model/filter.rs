//! Smart filters: saved group queries with materialized membership.
//!
//! # Responsibility
//! - Describe filter conditions and evaluate them against a group.
//! - Classify conditions by the group attribute they read, so a group save
//!   only recalculates filters whose inputs changed.
//!
//! # Invariants
//! - `group_ids` is derived membership, recomputed by repository hooks.
//! - A filter without conditions matches nothing (directory containers).

use crate::model::group::{Group, GroupId};
use crate::model::series::Season;
use crate::repo::Entity;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type FilterId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    /// Created and edited by a user.
    #[default]
    User,
    /// Top-level container for generated filters ("Tags", "Years", ...).
    Directory,
    /// Created automatically under a directory container.
    Generated,
}

impl FilterSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Directory => "directory",
            Self::Generated => "generated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "directory" => Some(Self::Directory),
            "generated" => Some(Self::Generated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// Group attribute a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConditionType {
    Tag,
    Year,
    Season,
    EpisodeCount,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterCondition {
    HasTag(String),
    InYear(i32),
    InSeason(Season),
    MinEpisodes(i64),
    /// Case-insensitive regular expression over the group name.
    TitleMatches(String),
}

impl FilterCondition {
    pub fn condition_type(&self) -> ConditionType {
        match self {
            Self::HasTag(_) => ConditionType::Tag,
            Self::InYear(_) => ConditionType::Year,
            Self::InSeason(_) => ConditionType::Season,
            Self::MinEpisodes(_) => ConditionType::EpisodeCount,
            Self::TitleMatches(_) => ConditionType::Title,
        }
    }

    /// Rejects title patterns that are not valid regular expressions.
    pub fn validate(&self) -> Result<(), String> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<Option<Regex>, String> {
        match self {
            Self::TitleMatches(pattern) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(Some)
                .map_err(|err| format!("invalid title pattern `{pattern}`: {err}")),
            _ => Ok(None),
        }
    }

    pub fn evaluate(&self, group: &Group) -> bool {
        self.evaluate_with(self.compile().ok().flatten().as_ref(), group)
    }

    fn evaluate_with(&self, title: Option<&Regex>, group: &Group) -> bool {
        let stats = &group.stats;
        match self {
            Self::HasTag(tag) => stats.tags.contains(tag),
            Self::InYear(year) => stats.years.contains(year),
            Self::InSeason(season) => stats.seasons.contains(season),
            Self::MinEpisodes(min) => stats.episode_count >= *min,
            Self::TitleMatches(_) => title.is_some_and(|regex| regex.is_match(&group.name)),
        }
    }
}

/// A filter's conditions with title patterns compiled once, for evaluating
/// many groups in a row.
pub struct FilterMatcher<'a> {
    match_mode: MatchMode,
    conditions: Vec<(&'a FilterCondition, Option<Regex>)>,
}

impl FilterMatcher<'_> {
    pub fn matches(&self, group: &Group) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        let mut results = self
            .conditions
            .iter()
            .map(|(condition, title)| condition.evaluate_with(title.as_ref(), group));
        match self.match_mode {
            MatchMode::All => results.all(|matched| matched),
            MatchMode::Any => results.any(|matched| matched),
        }
    }

    /// Number of compiled title patterns.
    pub fn compiled_patterns(&self) -> usize {
        self.conditions
            .iter()
            .filter(|(_, title)| title.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub id: FilterId,
    pub parent_id: Option<FilterId>,
    pub name: String,
    pub source: FilterSource,
    pub conditions: Vec<FilterCondition>,
    pub match_mode: MatchMode,
    /// Locked filters reject user edits.
    pub locked: bool,
    pub group_ids: BTreeSet<GroupId>,
}

impl Filter {
    pub fn new(name: impl Into<String>, conditions: Vec<FilterCondition>) -> Self {
        Self {
            name: name.into(),
            conditions,
            ..Self::default()
        }
    }

    /// Locked directory container with no conditions of its own.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: FilterSource::Directory,
            locked: true,
            ..Self::default()
        }
    }

    /// Locked single-condition child of a directory container.
    pub fn generated(
        parent_id: FilterId,
        name: impl Into<String>,
        condition: FilterCondition,
    ) -> Self {
        Self {
            parent_id: Some(parent_id),
            name: name.into(),
            source: FilterSource::Generated,
            conditions: vec![condition],
            locked: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, group: &Group) -> bool {
        self.matcher().matches(group)
    }

    /// Compiles title patterns once; invalid patterns never match.
    pub fn matcher(&self) -> FilterMatcher<'_> {
        FilterMatcher {
            match_mode: self.match_mode,
            conditions: self
                .conditions
                .iter()
                .map(|condition| (condition, condition.compile().ok().flatten()))
                .collect(),
        }
    }

    pub fn condition_types(&self) -> BTreeSet<ConditionType> {
        self.conditions
            .iter()
            .map(FilterCondition::condition_type)
            .collect()
    }

    /// True when any condition reads one of `changed`.
    pub fn depends_on(&self, changed: &BTreeSet<ConditionType>) -> bool {
        self.conditions
            .iter()
            .any(|condition| changed.contains(&condition.condition_type()))
    }
}

impl Entity for Filter {
    type Key = FilterId;
    type Partition = ();

    fn key(&self) -> FilterId {
        self.id
    }

    fn set_key(&mut self, key: FilterId) {
        self.id = key;
    }

    fn partition(&self) {}
}
