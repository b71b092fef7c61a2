use medialib_core::db::migrations::latest_version;
use medialib_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "groups",
        "series",
        "episodes",
        "filters",
        "episode_users",
        "group_users",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medialib.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "series");
}

#[test]
fn partially_migrated_database_is_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE groups (id INTEGER PRIMARY KEY AUTOINCREMENT, parent_id INTEGER NULL,
             name TEXT NOT NULL, locked INTEGER NOT NULL DEFAULT 0,
             stats TEXT NOT NULL DEFAULT '{}', stats_version INTEGER NOT NULL DEFAULT 0);
         CREATE TABLE series (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE episodes (id INTEGER PRIMARY KEY AUTOINCREMENT);
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "filters");
    assert_table_exists(&conn, "group_users");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failing_migration_reports_its_version_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflict.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE groups (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE series (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE episodes (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE filters (id INTEGER PRIMARY KEY AUTOINCREMENT);
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Migration { version, .. } => assert_eq!(*version, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("schema migration 2 failed"));
    assert!(std::error::Error::source(&err).is_some());

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 1);
    let users_table: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'episode_users';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(users_table, 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
