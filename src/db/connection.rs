use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, Error as SqlError, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::TIMESTAMP_FORMAT;

/// How long a connection waits on a locked database before giving up. Writers
/// from other threads serialize behind this instead of failing immediately.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Users created alongside a brand new database file.
const DEFAULT_USERS: &[(&str, &str)] = &[
    ("Modeler A", "modeler.a"),
    ("Texturer B", "texturer.b"),
];

/// Tables owned by the store. Migration DDL only ever interpolates names from
/// this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Users,
    Statuses,
    Pieces,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::Statuses => "Statuses",
            Self::Pieces => "Pieces",
        }
    }
}

/// A column added after the first release. Databases created before the column
/// existed get it through `ALTER TABLE` on the next startup.
struct ColumnMigration {
    table: Table,
    column: &'static str,
    declaration: &'static str,
}

const COLUMN_MIGRATIONS: &[ColumnMigration] = &[ColumnMigration {
    table: Table::Users,
    column: "Username",
    declaration: "TEXT NULL",
}];

/// Handle to the single embedded database file. The store keeps no connection
/// open: every operation calls [`Store::connect`] and drops the connection when
/// it returns.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `path` and bring its schema up
    /// to date.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::initialize(path, false)
    }

    /// Like [`Store::open`], additionally seeding the default users when this
    /// call created the database file.
    #[instrument(skip(path))]
    pub fn initialize(path: impl Into<PathBuf>, seed_default_users: bool) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let first_time = !path.exists();
        let store = Self { path };
        let conn = store.connect()?;
        ensure_schema(&conn)?;

        if first_time && seed_default_users {
            seed_users(&conn)?;
        }

        info!(path = %store.path.display(), first_time, "store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with foreign keys enforced and the busy timeout
    /// applied.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Create missing tables, apply column migrations and the partial unique index
/// on usernames. Safe to run on every startup.
#[instrument(skip(conn))]
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode, "journal mode set");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS Users (
            Id TEXT PRIMARY KEY,
            Name TEXT NOT NULL,
            Username TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS Statuses (
            Id TEXT PRIMARY KEY,
            Name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Pieces (
            Code TEXT PRIMARY KEY,
            Description TEXT,
            UserId TEXT NULL,
            StatusId TEXT NULL,
            PhotoPath TEXT NULL,
            RegisteredAt TEXT NOT NULL,
            FOREIGN KEY(UserId) REFERENCES Users(Id),
            FOREIGN KEY(StatusId) REFERENCES Statuses(Id)
        );",
    )?;

    for migration in COLUMN_MIGRATIONS {
        ensure_column(conn, migration)?;
    }

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS UX_Users_Username
            ON Users(Username)
            WHERE Username IS NOT NULL AND Username <> '';

        CREATE INDEX IF NOT EXISTS IX_Pieces_UserId ON Pieces(UserId);
        CREATE INDEX IF NOT EXISTS IX_Pieces_StatusId ON Pieces(StatusId);",
    )?;

    Ok(())
}

/// Report whether `table` already has `column` (case-insensitive, matching
/// SQLite's own identifier rules).
pub(crate) fn has_column(conn: &Connection, table: Table, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(names.iter().any(|name| name.eq_ignore_ascii_case(column)))
}

fn ensure_column(conn: &Connection, migration: &ColumnMigration) -> Result<()> {
    if has_column(conn, migration.table, migration.column)? {
        return Ok(());
    }

    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {};",
        migration.table.name(),
        migration.column,
        migration.declaration
    ))?;
    info!(
        table = migration.table.name(),
        column = migration.column,
        "added missing column"
    );
    Ok(())
}

fn seed_users(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for (name, username) in DEFAULT_USERS {
        tx.execute(
            "INSERT INTO Users (Id, Name, Username) VALUES (?1, ?2, ?3)",
            params![Uuid::new_v4().to_string(), name, username],
        )?;
    }
    tx.commit()?;
    info!(count = DEFAULT_USERS.len(), "seeded default users");
    Ok(())
}

/// Read a non-null id column.
pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    parse_uuid(idx, &raw)
}

/// Read a nullable id column. Empty strings count as unassigned.
pub(crate) fn optional_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_uuid(idx, value).map(Some),
    }
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|err| SqlError::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|err| SqlError::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Accept the canonical format plus the variants older rows may carry
/// (fractional seconds, space separator).
fn parse_timestamp(raw: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
}

pub(crate) fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// UNIQUE or PRIMARY KEY constraint failure.
pub(crate) fn is_unique_violation(err: &SqlError) -> bool {
    matches!(
        err,
        SqlError::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub(crate) fn is_foreign_key_violation(err: &SqlError) -> bool {
    matches!(
        err,
        SqlError::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
