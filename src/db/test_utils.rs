#![allow(dead_code)]
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::db::connection::{format_timestamp, Store};

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Fresh store backed by a file inside a temporary directory. The directory
/// guard must outlive the store.
pub(crate) fn temp_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("pieces.sqlite")).unwrap();
    (dir, store)
}

pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub(crate) fn direct_insert_user(conn: &Connection, name: &str, username: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO Users (Id, Name, Username) VALUES (?1, ?2, ?3)",
        params![id.to_string(), name, username],
    )
    .unwrap();
    id
}

pub(crate) fn direct_insert_status(conn: &Connection, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO Statuses (Id, Name) VALUES (?1, ?2)",
        params![id.to_string(), name],
    )
    .unwrap();
    id
}

pub(crate) struct DirectPiece<'a> {
    pub(crate) code: &'a str,
    pub(crate) description: &'a str,
    pub(crate) user_id: Option<Uuid>,
    pub(crate) status_id: Option<Uuid>,
    pub(crate) registered_at: NaiveDateTime,
}

/// Insert a piece with an explicit registration time so ordering tests do not
/// depend on the wall clock.
pub(crate) fn direct_insert_piece(conn: &Connection, piece: &DirectPiece<'_>) {
    conn.execute(
        "INSERT INTO Pieces (Code, Description, UserId, StatusId, PhotoPath, RegisteredAt)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        params![
            piece.code,
            piece.description,
            piece.user_id.map(|id| id.to_string()),
            piece.status_id.map(|id| id.to_string()),
            format_timestamp(&piece.registered_at),
        ],
    )
    .unwrap();
}
