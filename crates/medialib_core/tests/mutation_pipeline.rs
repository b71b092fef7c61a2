mod common;

use common::{params, seeded_rows, track_repo, track_repo_with, Track, TrackParams};
use medialib_core::repo::{CacheMode, HookError, TrackerScope};
use medialib_core::{RepoError, StoreError};

#[test]
fn begin_runs_before_the_write_and_end_after_it() {
    let (store, repo) = track_repo();

    let saved = repo.save(Track::new(1, 1, "  First  "), &params()).unwrap();
    assert_eq!(saved.id, 1);
    assert_eq!(saved.title, "First");
    assert_eq!(store.write_count(), 1);
    assert_eq!(
        repo.hooks().events(),
        vec!["begin_save First writes=0", "end_save 1 writes=1"]
    );
}

#[test]
fn store_failure_leaves_cache_index_and_tracker_untouched() {
    let (store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();
    let consumer = repo.tracker().subscribe(TrackerScope::All);

    store.fail_next_write("disk full");
    let err = repo
        .modify(&1, |track| track.album = 999, &params())
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Store {
            source: StoreError::Unavailable(_),
            ..
        }
    ));
    assert!(!err.is_committed());

    assert_eq!(repo.get(&1).unwrap().unwrap().album, 100);
    assert!(repo.lookup_keys(|i| &i.by_album, &999).unwrap().is_empty());
    assert!(repo.verify_indexes());
    assert!(repo.tracker().drain(consumer).unwrap().is_empty());
    let events = repo.hooks().take_events();
    assert!(events.iter().all(|event| !event.starts_with("end_save")));
}

#[test]
fn begin_rejection_writes_nothing() {
    let (store, repo) = track_repo();

    let err = repo.save(Track::new(1, 1, "   "), &params()).unwrap_err();
    match err {
        RepoError::BeginHook { source, .. } => {
            assert!(matches!(source, HookError::Rejected(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.write_count(), 0);
    assert!(repo.get_all().unwrap().is_empty());
    assert!(repo.hooks().events().is_empty());
}

#[test]
fn end_failure_is_reported_after_the_commit() {
    let (store, repo) = track_repo();
    let failing = TrackParams { fail_end: true };

    let err = repo.save(Track::new(1, 1, "Kept"), &failing).unwrap_err();
    assert!(err.is_committed());
    assert!(matches!(err, RepoError::Cascade { .. }));
    assert_eq!(store.snapshot().len(), 1);
    assert_eq!(repo.get(&1).unwrap().unwrap().title, "Kept");
}

#[test]
fn unchanged_touch_runs_hooks_without_writing() {
    let (store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let touched = repo.touch(&2, &params()).unwrap().unwrap();
    assert_eq!(touched.title, "Theme");
    assert_eq!(store.write_count(), 0);
    assert_eq!(
        repo.hooks().events(),
        vec!["begin_save Theme writes=0", "end_save 2 writes=0"]
    );
    assert!(repo.touch(&42, &params()).unwrap().is_none());
}

#[test]
fn save_many_uses_one_round_trip_and_orders_phases() {
    let (store, repo) = track_repo();

    let saved = repo
        .save_many(
            vec![
                Track::new(1, 7, "One"),
                Track::new(1, 7, "Two"),
                Track::new(2, 8, "Three"),
            ],
            &params(),
        )
        .unwrap();
    assert_eq!(saved.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(store.write_count(), 1);
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &7).unwrap(), vec![1, 2]);
    assert_eq!(
        repo.hooks().events(),
        vec![
            "begin_save One writes=0",
            "begin_save Two writes=0",
            "begin_save Three writes=0",
            "end_save 1 writes=1",
            "end_save 2 writes=1",
            "end_save 3 writes=1",
        ]
    );
}

#[test]
fn save_many_rejection_aborts_the_whole_batch() {
    let (store, repo) = track_repo();

    let err = repo
        .save_many(
            vec![Track::new(1, 7, "Fine"), Track::new(1, 7, "")],
            &params(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::BeginHook { .. }));
    assert_eq!(store.write_count(), 0);
    assert!(repo.get_all().unwrap().is_empty());
}

#[test]
fn save_many_mixes_inserts_and_updates() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();
    let mut existing = repo.get(&3).unwrap().unwrap();
    existing.title = "Finale".to_string();

    let saved = repo
        .save_many(vec![existing, Track::new(20, 200, "Encore")], &params())
        .unwrap();
    assert_eq!(saved[0].id, 3);
    assert_eq!(saved[1].id, 4);
    assert_eq!(repo.get(&3).unwrap().unwrap().title, "Finale");
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &200).unwrap(), vec![3, 4]);
}

#[test]
fn delete_many_skips_misses_in_one_round_trip() {
    let (store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let deleted = repo.delete_many(&[1, 99, 3, 1], &params()).unwrap();
    assert_eq!(deleted.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.snapshot().len(), 1);
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &100).unwrap(), vec![2]);
}

#[test]
fn delete_rejection_keeps_the_entity() {
    let (store, repo) = track_repo();
    let pinned = repo
        .save(Track::new(1, 1, "Keep").tagged(&["pinned"]), &params())
        .unwrap();

    let err = repo.delete(&pinned.id, &params()).unwrap_err();
    assert!(matches!(err, RepoError::BeginHook { .. }));
    assert!(repo.get(&pinned.id).unwrap().is_some());
    assert_eq!(store.snapshot().len(), 1);
}

#[test]
fn deleting_an_absent_key_runs_no_hooks() {
    let (_store, repo) = track_repo();
    assert!(repo.delete(&5, &params()).unwrap().is_none());
    assert!(repo.hooks().events().is_empty());
}

#[test]
fn find_and_delete_removes_matches() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let deleted = repo
        .find_and_delete(|track| track.owner == 10, &params())
        .unwrap();
    assert_eq!(deleted.len(), 2);
    assert_eq!(repo.get_all().unwrap().len(), 1);
    assert!(repo
        .hooks()
        .events()
        .contains(&"end_delete 2".to_string()));
}

#[test]
fn end_delete_failure_still_removes_the_entity() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let err = repo
        .delete(&1, &TrackParams { fail_end: true })
        .unwrap_err();
    assert!(err.is_committed());
    assert!(repo.get(&1).unwrap().is_none());
}
