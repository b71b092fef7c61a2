mod common;

use common::{params, seeded_rows, track_repo, track_repo_with, Track};
use medialib_core::repo::CacheMode;
use medialib_core::Store;

fn ids(tracks: &[Track]) -> Vec<i64> {
    tracks.iter().map(|track| track.id).collect()
}

#[test]
fn populate_mirrors_store_and_builds_indexes() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    assert!(!repo.is_populated());

    assert_eq!(repo.populate().unwrap(), 3);
    assert!(repo.is_populated());
    assert_eq!(repo.diagnostics().cached, 3);
    assert_eq!(ids(&repo.get_all().unwrap()), vec![1, 2, 3]);
    assert_eq!(ids(&repo.lookup(|i| &i.by_album, &100).unwrap()), vec![1, 2]);
    assert_eq!(
        ids(&repo.lookup(|i| &i.by_tag, &"vocal".to_string()).unwrap()),
        vec![2]
    );
    assert!(repo.verify_indexes());
}

#[test]
fn index_follows_updates_and_deletes() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    repo.modify(&1, |track| track.album = 200, &params())
        .unwrap()
        .unwrap();
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &100).unwrap(), vec![2]);
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &200).unwrap(), vec![1, 3]);

    repo.delete(&3, &params()).unwrap().unwrap();
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &200).unwrap(), vec![1]);
    assert!(repo.get(&3).unwrap().is_none());
    assert!(repo.verify_indexes());
}

#[test]
fn multi_value_index_drops_removed_values() {
    let (_store, repo) = track_repo();
    let saved = repo
        .save(Track::new(1, 1, "Song").tagged(&["live", "rare"]), &params())
        .unwrap();

    repo.modify(&saved.id, |track| track.tags.retain(|t| t != "rare"), &params())
        .unwrap();
    assert!(repo
        .lookup_keys(|i| &i.by_tag, &"rare".to_string())
        .unwrap()
        .is_empty());
    assert_eq!(
        repo.lookup_keys(|i| &i.by_tag, &"live".to_string()).unwrap(),
        vec![saved.id]
    );
    assert!(repo.verify_indexes());
}

#[test]
fn direct_mode_reads_and_writes_through_the_store() {
    let (store, repo) = track_repo_with(CacheMode::Direct, seeded_rows());
    assert_eq!(repo.populate().unwrap(), 0);
    assert_eq!(repo.diagnostics().cached, 0);

    let saved = repo.save(Track::new(10, 100, "Bonus"), &params()).unwrap();
    assert_eq!(saved.id, 4);
    assert_eq!(store.load(&4).unwrap().unwrap().title, "Bonus");
    assert_eq!(repo.get(&4).unwrap().unwrap(), saved);
    assert_eq!(ids(&repo.lookup(|i| &i.by_album, &100).unwrap()), vec![1, 2, 4]);
    assert_eq!(repo.diagnostics().cached, 0);
}

#[test]
fn switch_mode_converts_a_live_repository() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    repo.switch_mode(CacheMode::Direct).unwrap();
    assert_eq!(repo.mode(), CacheMode::Direct);
    assert_eq!(repo.diagnostics().cached, 0);
    repo.save(Track::new(30, 300, "Direct write"), &params())
        .unwrap();

    repo.switch_mode(CacheMode::Cached).unwrap();
    assert_eq!(repo.mode(), CacheMode::Cached);
    assert_eq!(repo.diagnostics().cached, 4);
    assert_eq!(repo.lookup_keys(|i| &i.by_album, &300).unwrap(), vec![4]);
    assert!(repo.verify_indexes());
}

#[test]
fn cleared_indexes_fall_back_to_cache_scan() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    repo.clear_indexes();
    repo.save(Track::new(10, 100, "Late"), &params()).unwrap();
    assert_eq!(
        repo.lookup_keys(|i| &i.by_album, &100).unwrap(),
        vec![1, 2, 4]
    );

    repo.populate_indexes();
    assert_eq!(
        repo.lookup_keys(|i| &i.by_album, &100).unwrap(),
        vec![1, 2, 4]
    );
    assert!(repo.verify_indexes());
}

#[test]
fn cleared_cache_reads_from_store_until_repopulated() {
    let (store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    repo.clear_cache();
    assert!(!repo.is_populated());
    assert_eq!(repo.get(&2).unwrap().unwrap().title, "Theme");
    repo.save(Track::new(10, 100, "Uncached"), &params())
        .unwrap();
    assert_eq!(store.snapshot().len(), 4);

    assert_eq!(repo.populate().unwrap(), 4);
    assert_eq!(repo.get(&4).unwrap().unwrap().title, "Uncached");
}

#[test]
fn get_many_keeps_input_order_and_skips_misses() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let found = repo.get_many(&[3, 99, 1]).unwrap();
    assert_eq!(ids(&found), vec![3, 1]);
    assert_eq!(
        repo.find_one(|t| t.title.starts_with('O')).unwrap().unwrap().id,
        3
    );
}

#[test]
fn nested_reads_from_lookup_predicates_do_not_deadlock() {
    let (_store, repo) = track_repo_with(CacheMode::Cached, seeded_rows());
    repo.populate().unwrap();

    let albums_with_siblings = repo
        .find(|track| {
            repo.lookup_keys(|i| &i.by_album, &track.album)
                .map(|keys| keys.len() > 1)
                .unwrap_or(false)
        })
        .unwrap();
    assert_eq!(ids(&albums_with_siblings), vec![1, 2]);
}
