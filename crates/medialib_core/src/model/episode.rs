//! Episode record.

use crate::model::series::SeriesId;
use crate::repo::Entity;
use serde::{Deserialize, Serialize};

pub type EpisodeId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    #[default]
    Regular,
    Special,
    Other,
}

impl EpisodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Special => "special",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(Self::Regular),
            "special" => Some(Self::Special),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// One episode of a series, optionally backed by a video file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub series_id: SeriesId,
    pub kind: EpisodeKind,
    pub number: i32,
    pub title: String,
    /// Content hash of the matched video file.
    pub file_hash: Option<String>,
}

impl Episode {
    pub fn new(series_id: SeriesId, number: i32, title: impl Into<String>) -> Self {
        Self {
            series_id,
            number,
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Episode {
    type Key = EpisodeId;
    type Partition = ();

    fn key(&self) -> EpisodeId {
        self.id
    }

    fn set_key(&mut self, key: EpisodeId) {
        self.id = key;
    }

    fn partition(&self) {}
}
