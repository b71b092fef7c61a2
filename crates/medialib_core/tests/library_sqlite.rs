use medialib_core::library::{EpisodeParams, GroupParams, SeriesParams, TAGS_DIRECTORY};
use medialib_core::model::{Episode, Group, Season, SeasonName, Series};
use medialib_core::repo::CacheMode;
use medialib_core::{DatabaseConfig, Library, LibraryConfig};
use std::path::Path;

fn file_config(path: &Path) -> LibraryConfig {
    LibraryConfig {
        database: DatabaseConfig::File {
            path: path.to_path_buf(),
        },
        ..LibraryConfig::default()
    }
}

fn seed(library: &Library) -> (i64, i64) {
    let group = library
        .groups()
        .save(Group::new("Mushishi"), &GroupParams::default())
        .unwrap();
    let mut series = Series::new(group.id, "Mushishi", 3561);
    series.tags.insert("supernatural".to_string());
    series.begin_year = Some(2005);
    series.seasons.insert(Season::new(SeasonName::Autumn, 2005));
    let series = library
        .series()
        .save(series, &SeriesParams::default())
        .unwrap();
    for number in 1..=3 {
        let mut episode = Episode::new(series.id, number, format!("Episode {number}"));
        episode.file_hash = Some(format!(" hash-{number} "));
        library
            .episodes()
            .save(episode, &EpisodeParams::default())
            .unwrap();
    }
    (group.id, series.id)
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medialib.db");

    let (group_id, series_id) = {
        let library = Library::open(&file_config(&path)).unwrap();
        let ids = seed(&library);
        let episode = library.episodes().find_number(ids.1, Default::default(), 1);
        let episode = episode.unwrap().unwrap();
        library
            .episode_users()
            .set_watched(9, episode.id, true)
            .unwrap();
        ids
    };

    let library = Library::open(&file_config(&path)).unwrap();
    let series = library.series().get(&series_id).unwrap().unwrap();
    assert_eq!(series.episode_count, 3);
    assert!(series.tags.contains("supernatural"));
    assert_eq!(series.seasons.len(), 1);

    let group = library.groups().get(&group_id).unwrap().unwrap();
    assert_eq!(group.stats.episode_count, 3);
    assert!(group.stats.years.contains(&2005));

    assert_eq!(library.episodes().by_file_hash("HASH-2").unwrap().len(), 1);
    let tags = library
        .filters()
        .find_named(None, TAGS_DIRECTORY)
        .unwrap()
        .unwrap();
    let generated = library
        .filters()
        .find_named(Some(tags.id), "supernatural")
        .unwrap()
        .unwrap();
    assert!(generated.group_ids.contains(&group_id));

    let record = library.group_users().find_record(9, group_id).unwrap().unwrap();
    assert_eq!(record.watched_count, 1);
    assert_eq!(record.unwatched_count, 2);

    let report = library.reconcile().unwrap();
    assert_eq!(report.total(), 0);
    for repository in library.diagnostics() {
        assert_eq!(repository.mode, CacheMode::Cached);
    }
}

#[test]
fn direct_mode_override_serves_reads_from_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.db");
    let mut config = file_config(&path);
    config
        .cache
        .overrides
        .insert("episodes".to_string(), CacheMode::Direct);

    let library = Library::open(&config).unwrap();
    let (_, series_id) = seed(&library);

    let diagnostics = library.diagnostics();
    let episodes = diagnostics
        .iter()
        .find(|repository| repository.name == "episodes")
        .unwrap();
    assert_eq!(episodes.mode, CacheMode::Direct);
    assert_eq!(episodes.cached, 0);
    assert_eq!(library.episodes().count_for_series(series_id).unwrap(), 3);
    assert_eq!(
        library.series().get(&series_id).unwrap().unwrap().episode_count,
        3
    );
}

#[test]
fn config_document_opens_a_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("from-json.db");
    let raw = serde_json::json!({
        "database": { "kind": "file", "path": path },
        "cache": { "overrides": { "group_users": "direct" } },
        "reconcile_on_open": true
    })
    .to_string();

    let config = LibraryConfig::from_json_str(&raw).unwrap();
    let library = Library::open(&config).unwrap();
    seed(&library);
    assert_eq!(library.stats().unwrap().episodes, 3);
    assert_eq!(library.group_users().mode(), CacheMode::Direct);
}
