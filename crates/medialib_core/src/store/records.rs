//! Table mappings for the library records.
//!
//! # Invariants
//! - Set-valued and aggregate columns are JSON text.
//! - Enum columns hold the lowercase names from each enum's `as_str`.

use super::sqlite::{bool_column, bool_value, json_column, json_value, optional_int, SqlRecord};
use super::{StoreError, StoreResult};
use crate::model::{
    Episode, EpisodeKind, EpisodeUser, Filter, FilterSource, Group, GroupUser, MatchMode, Series,
};
use rusqlite::types::Value;
use rusqlite::Row;

impl SqlRecord for Group {
    const TABLE: &'static str = "groups";
    const COLUMNS: &'static [&'static str] =
        &["parent_id", "name", "locked", "stats", "stats_version"];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            optional_int(self.parent_id),
            Value::Text(self.name.clone()),
            bool_value(self.locked),
            json_value(&self.stats)?,
            Value::Integer(self.stats_version),
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            parent_id: row.get("parent_id")?,
            name: row.get("name")?,
            locked: bool_column(row, Self::TABLE, "locked")?,
            stats: json_column(row, Self::TABLE, "stats")?,
            stats_version: row.get("stats_version")?,
        })
    }
}

impl SqlRecord for Series {
    const TABLE: &'static str = "series";
    const COLUMNS: &'static [&'static str] = &[
        "group_id",
        "title",
        "anidb_id",
        "begin_year",
        "end_year",
        "tags",
        "seasons",
        "episode_count",
        "stats_version",
    ];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.group_id),
            Value::Text(self.title.clone()),
            Value::Integer(self.anidb_id),
            optional_int(self.begin_year.map(i64::from)),
            optional_int(self.end_year.map(i64::from)),
            json_value(&self.tags)?,
            json_value(&self.seasons)?,
            Value::Integer(self.episode_count),
            Value::Integer(self.stats_version),
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            group_id: row.get("group_id")?,
            title: row.get("title")?,
            anidb_id: row.get("anidb_id")?,
            begin_year: row.get("begin_year")?,
            end_year: row.get("end_year")?,
            tags: json_column(row, Self::TABLE, "tags")?,
            seasons: json_column(row, Self::TABLE, "seasons")?,
            episode_count: row.get("episode_count")?,
            stats_version: row.get("stats_version")?,
        })
    }
}

impl SqlRecord for Episode {
    const TABLE: &'static str = "episodes";
    const COLUMNS: &'static [&'static str] = &["series_id", "kind", "number", "title", "file_hash"];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.series_id),
            Value::Text(self.kind.as_str().to_string()),
            Value::Integer(i64::from(self.number)),
            Value::Text(self.title.clone()),
            self.file_hash.clone().map_or(Value::Null, Value::Text),
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        let kind: String = row.get("kind")?;
        Ok(Self {
            id: row.get("id")?,
            series_id: row.get("series_id")?,
            kind: EpisodeKind::parse(&kind).ok_or_else(|| {
                StoreError::InvalidData(format!("invalid episode kind `{kind}`"))
            })?,
            number: row.get("number")?,
            title: row.get("title")?,
            file_hash: row.get("file_hash")?,
        })
    }
}

impl SqlRecord for Filter {
    const TABLE: &'static str = "filters";
    const COLUMNS: &'static [&'static str] = &[
        "parent_id",
        "name",
        "source",
        "conditions",
        "match_mode",
        "locked",
        "group_ids",
    ];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            optional_int(self.parent_id),
            Value::Text(self.name.clone()),
            Value::Text(self.source.as_str().to_string()),
            json_value(&self.conditions)?,
            Value::Text(self.match_mode.as_str().to_string()),
            bool_value(self.locked),
            json_value(&self.group_ids)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        let source: String = row.get("source")?;
        let match_mode: String = row.get("match_mode")?;
        Ok(Self {
            id: row.get("id")?,
            parent_id: row.get("parent_id")?,
            name: row.get("name")?,
            source: FilterSource::parse(&source).ok_or_else(|| {
                StoreError::InvalidData(format!("invalid filter source `{source}`"))
            })?,
            conditions: json_column(row, Self::TABLE, "conditions")?,
            match_mode: MatchMode::parse(&match_mode).ok_or_else(|| {
                StoreError::InvalidData(format!("invalid match mode `{match_mode}`"))
            })?,
            locked: bool_column(row, Self::TABLE, "locked")?,
            group_ids: json_column(row, Self::TABLE, "group_ids")?,
        })
    }
}

impl SqlRecord for EpisodeUser {
    const TABLE: &'static str = "episode_users";
    const COLUMNS: &'static [&'static str] = &["user_id", "episode_id", "watched"];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.user_id),
            Value::Integer(self.episode_id),
            bool_value(self.watched),
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            episode_id: row.get("episode_id")?,
            watched: bool_column(row, Self::TABLE, "watched")?,
        })
    }
}

impl SqlRecord for GroupUser {
    const TABLE: &'static str = "group_users";
    const COLUMNS: &'static [&'static str] =
        &["user_id", "group_id", "watched_count", "unwatched_count"];

    fn to_values(&self) -> StoreResult<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.user_id),
            Value::Integer(self.group_id),
            Value::Integer(self.watched_count),
            Value::Integer(self.unwatched_count),
        ])
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            group_id: row.get("group_id")?,
            watched_count: row.get("watched_count")?,
            unwatched_count: row.get("unwatched_count")?,
        })
    }
}
