//! Domain models that mirror the SQLite schema. These stay plain data holders
//! so the store and the report layers own all behavior around them.

use std::fmt;

use chrono::NaiveDateTime;
use uuid::Uuid;

/// Storage format for `Pieces.RegisteredAt`. Second precision, no offset:
/// timestamps are recorded in local wall-clock time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Person a piece can be assigned to.
pub struct User {
    pub id: Uuid,
    /// Display name, never blank.
    pub name: String,
    /// Optional login-style handle. Unique among users that have one.
    pub username: Option<String>,
}

impl fmt::Display for User {
    /// `Name (username)` when a username exists, otherwise just the name. Pickers
    /// use this to tell apart users sharing a display name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.username.as_deref() {
            Some(username) if !username.trim().is_empty() => {
                write!(f, "{} ({})", self.name, username)
            }
            _ => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Workflow stage a piece can be tagged with ("In progress", "Done", ...).
pub struct Status {
    /// Primary key. Pieces reference it through `Pieces.StatusId`.
    pub id: Uuid,
    /// Display name shown in pickers and reports.
    pub name: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tracked work item. The code is the primary key and is chosen by the caller.
pub struct Piece {
    /// Unique, trimmed identifier such as `P-100`.
    pub code: String,
    /// Free text. Rows stored without one read back as an empty string.
    pub description: String,
    /// Assigned user, if any. Deleting that user is refused while this is set.
    pub user_id: Option<Uuid>,
    /// Current status, if any.
    pub status_id: Option<Uuid>,
    /// Path to a reference photo on disk. Only stored, never opened here.
    pub photo_path: Option<String>,
    /// Set once on insert; upserts never touch it.
    pub registered_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Editable fields of a piece, as submitted to an upsert.
pub struct PieceDraft {
    /// Key of the piece to insert or update. Trimmed before use; blank is
    /// rejected.
    pub code: String,
    pub description: String,
    /// `None` clears an existing assignment on update.
    pub user_id: Option<Uuid>,
    /// `None` clears an existing status on update.
    pub status_id: Option<Uuid>,
    /// A blank path is stored as NULL.
    pub photo_path: Option<String>,
}

impl PieceDraft {
    /// Draft with only the code set; every other field starts empty.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn status(mut self, status_id: Option<Uuid>) -> Self {
        self.status_id = status_id;
        self
    }

    pub fn photo(mut self, photo_path: Option<String>) -> Self {
        self.photo_path = photo_path;
        self
    }
}

impl From<&Piece> for PieceDraft {
    fn from(piece: &Piece) -> Self {
        Self {
            code: piece.code.clone(),
            description: piece.description.clone(),
            user_id: piece.user_id,
            status_id: piece.status_id,
            photo_path: piece.photo_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One row of the report projection: the piece plus the names resolved through
/// joins. Unassigned pieces carry empty names.
pub struct ReportEntry {
    pub piece: Piece,
    /// Name of the assigned user, or empty.
    pub user_name: String,
    /// Name of the current status, or empty.
    pub status_name: String,
}
