//! Per-user records, partitioned by user for change tracking.

use crate::model::episode::EpisodeId;
use crate::model::group::GroupId;
use crate::repo::Entity;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Watched state of one episode for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeUser {
    pub id: i64,
    pub user_id: UserId,
    pub episode_id: EpisodeId,
    pub watched: bool,
}

impl EpisodeUser {
    pub fn new(user_id: UserId, episode_id: EpisodeId, watched: bool) -> Self {
        Self {
            id: 0,
            user_id,
            episode_id,
            watched,
        }
    }
}

impl Entity for EpisodeUser {
    type Key = i64;
    type Partition = UserId;

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn partition(&self) -> UserId {
        self.user_id
    }
}

/// Watched/unwatched counters over a group's subtree for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUser {
    pub id: i64,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub watched_count: i64,
    pub unwatched_count: i64,
}

impl GroupUser {
    pub fn new(user_id: UserId, group_id: GroupId) -> Self {
        Self {
            user_id,
            group_id,
            ..Self::default()
        }
    }
}

impl Entity for GroupUser {
    type Key = i64;
    type Partition = UserId;

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn partition(&self) -> UserId {
        self.user_id
    }
}
