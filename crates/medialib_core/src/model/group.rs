//! Group record: a named, nestable collection of series.
//!
//! # Invariants
//! - `parent_id` is a key reference; it may point at the group itself or
//!   form a cycle in corrupt data, so every walk must be visited-guarded.
//! - `stats` covers the whole subtree, direct series and nested groups.

use crate::model::series::Season;
use crate::repo::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type GroupId = i64;

/// Aggregate over every series in a group's subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub series_count: i64,
    pub episode_count: i64,
    pub tags: BTreeSet<String>,
    pub years: BTreeSet<i32>,
    pub seasons: BTreeSet<Season>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub parent_id: Option<GroupId>,
    pub name: String,
    /// Locked groups keep their name when series are re-grouped.
    pub locked: bool,
    pub stats: GroupStats,
    pub stats_version: i64,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(name: impl Into<String>, parent_id: GroupId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::new(name)
        }
    }

    /// Parent key, ignoring a self-reference.
    pub fn real_parent(&self) -> Option<GroupId> {
        self.parent_id.filter(|parent| *parent != self.id)
    }
}

impl Entity for Group {
    type Key = GroupId;
    type Partition = ();

    fn key(&self) -> GroupId {
        self.id
    }

    fn set_key(&mut self, key: GroupId) {
        self.id = key;
    }

    fn partition(&self) {}
}
