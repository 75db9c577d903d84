//! Collaborator-facing surface over the store.
//!
//! Each call opens its own connection, runs one store operation and drops the
//! connection before returning. Successful mutations publish exactly one change
//! notification, after the write has committed.

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{self, PieceFilter, ReportCriteria, Store};
use crate::error::Result;
use crate::events::{ChangeKind, EventBus};
use crate::models::{Piece, PieceDraft, ReportEntry, Status, User};

/// Store plus event bus. Cloning is cheap and clones share both, so one
/// repository can be handed to every view and worker thread.
#[derive(Debug, Clone)]
pub struct Repository {
    store: Store,
    events: EventBus,
}

impl Repository {
    /// Wire a store to the bus its mutations are announced on.
    pub fn new(store: Store, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Underlying store, for callers that need the database path.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Bus to subscribe on for change notifications.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Every user, ordered by name.
    pub fn list_users(&self) -> Result<Vec<User>> {
        db::fetch_users(&self.store.connect()?)
    }

    /// Create a user. Fails with `Validation` on a blank name and `Conflict`
    /// when the username is taken.
    pub fn add_user(&self, name: &str, username: Option<&str>) -> Result<User> {
        let user = db::create_user(&self.store.connect()?, name, username)?;
        self.events.publish(ChangeKind::Users);
        Ok(user)
    }

    /// Replace a user's name and username.
    pub fn update_user(&self, id: Uuid, name: &str, username: Option<&str>) -> Result<()> {
        db::update_user(&self.store.connect()?, id, name, username)?;
        self.events.publish(ChangeKind::Users);
        Ok(())
    }

    /// Remove a user no piece is assigned to; otherwise `ReferentialIntegrity`.
    pub fn delete_user(&self, id: Uuid) -> Result<()> {
        db::delete_user(&mut self.store.connect()?, id)?;
        self.events.publish(ChangeKind::Users);
        Ok(())
    }

    /// Display name for `id`, or `None` when no such user exists.
    pub fn user_name(&self, id: Uuid) -> Result<Option<String>> {
        db::fetch_user_name(&self.store.connect()?, id)
    }

    /// Every status, ordered by name.
    pub fn list_statuses(&self) -> Result<Vec<Status>> {
        db::fetch_statuses(&self.store.connect()?)
    }

    /// Blank names are ignored: `Ok(None)` and no notification.
    pub fn add_status(&self, name: &str) -> Result<Option<Status>> {
        let status = db::create_status(&self.store.connect()?, name)?;
        if status.is_some() {
            self.events.publish(ChangeKind::Statuses);
        }
        Ok(status)
    }

    /// Change a status's display name.
    pub fn rename_status(&self, id: Uuid, name: &str) -> Result<()> {
        db::rename_status(&self.store.connect()?, id, name)?;
        self.events.publish(ChangeKind::Statuses);
        Ok(())
    }

    /// Remove a status no piece uses; otherwise `ReferentialIntegrity`.
    pub fn delete_status(&self, id: Uuid) -> Result<()> {
        db::delete_status(&mut self.store.connect()?, id)?;
        self.events.publish(ChangeKind::Statuses);
        Ok(())
    }

    /// Display name for `id`, or `None` when no such status exists.
    pub fn status_name(&self, id: Uuid) -> Result<Option<String>> {
        db::fetch_status_name(&self.store.connect()?, id)
    }

    /// Pieces matching `filter`, newest registration first.
    pub fn list_pieces(&self, filter: &PieceFilter) -> Result<Vec<Piece>> {
        db::fetch_pieces(&self.store.connect()?, filter)
    }

    /// Piece with the given code, ignoring surrounding whitespace.
    pub fn find_piece(&self, code: &str) -> Result<Option<Piece>> {
        db::find_piece(&self.store.connect()?, code)
    }

    /// Insert or update by code. New pieces are registered at the current local
    /// time, truncated to whole seconds.
    #[instrument(skip(self, draft), fields(code = %draft.code))]
    pub fn upsert_piece(&self, draft: &PieceDraft) -> Result<Piece> {
        let piece = db::upsert_piece(&mut self.store.connect()?, draft, now())?;
        self.events.publish(ChangeKind::Pieces);
        Ok(piece)
    }

    /// Filtered, ordered report projection. Read-only.
    pub fn query_report(&self, criteria: &ReportCriteria) -> Result<Vec<ReportEntry>> {
        db::query_report(&self.store.connect()?, criteria)
    }
}

fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
