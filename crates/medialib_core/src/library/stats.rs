//! Library-wide summary served from the caches.

use super::{Library, LibraryError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Number of tags reported in [`LibraryStats::top_tags`].
const TOP_TAGS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub groups: usize,
    pub series: usize,
    pub episodes: usize,
    /// Episodes with a file hash attached.
    pub files: usize,
    pub filters: usize,
    /// Distinct users with any watched-state record.
    pub users: usize,
    pub watched_episodes: usize,
    /// Most used series tags, by count then name.
    pub top_tags: Vec<(String, usize)>,
}

impl Library {
    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let episodes = self.episodes().get_all()?;
        let series = self.series().get_all()?;
        let records = self.episode_users().get_all()?;

        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for entry in &series {
            for tag in &entry.tags {
                *tag_counts.entry(tag.clone()).or_default() += 1;
            }
        }
        let mut top_tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(TOP_TAGS);

        let users: BTreeSet<i64> = records.iter().map(|record| record.user_id).collect();
        Ok(LibraryStats {
            groups: self.groups().get_all()?.len(),
            series: series.len(),
            episodes: episodes.len(),
            files: episodes.iter().filter(|e| e.file_hash.is_some()).count(),
            filters: self.filters().get_all()?.len(),
            users: users.len(),
            watched_episodes: records.iter().filter(|record| record.watched).count(),
            top_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::library::{EpisodeParams, GroupParams, Library, SeriesParams};
    use crate::model::{Episode, Group, Series};

    #[test]
    fn stats_count_records_and_rank_tags() {
        let library = Library::in_memory().unwrap();
        let group = library
            .groups()
            .save(Group::new("Shows"), &GroupParams::default())
            .unwrap();
        for (title, anidb, tags) in [("A", 1, vec!["drama", "mecha"]), ("B", 2, vec!["drama"])] {
            let mut series = Series::new(group.id, title, anidb);
            series.tags = tags.into_iter().map(str::to_string).collect();
            let series = library
                .series()
                .save(series, &SeriesParams::default())
                .unwrap();
            let mut episode = Episode::new(series.id, 1, "Pilot");
            episode.file_hash = Some(format!("hash{anidb}"));
            library
                .episodes()
                .save(episode, &EpisodeParams::default())
                .unwrap();
        }
        let episode_id = library.episodes().get_all().unwrap()[0].id;
        library.episode_users().set_watched(7, episode_id, true).unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.series, 2);
        assert_eq!(stats.episodes, 2);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.users, 1);
        assert_eq!(stats.watched_episodes, 1);
        assert_eq!(stats.top_tags[0], ("drama".to_string(), 2));
        assert_eq!(stats.top_tags[1], ("mecha".to_string(), 1));
        // Directory filters for both tags plus the "Tags" container.
        assert!(stats.filters >= 3);
    }
}
