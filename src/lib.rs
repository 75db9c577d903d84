//! Data access and reporting core for piece assignment tracking.
//!
//! Pieces are work items identified by a caller-chosen code, optionally
//! assigned to a user and tagged with a status. The [`Repository`] is the
//! surface views talk to; it persists through the SQLite [`Store`] and
//! announces every committed change on the [`EventBus`]. Reports are queried
//! with [`ReportCriteria`] and rendered to PDF by [`report`].
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod report;
pub mod repository;

pub use config::{load_config, AppConfig};
pub use db::{PieceFilter, ReportCriteria, ReportOrder, SortDirection, SortKey, Store};
pub use error::{Error, Result};
pub use events::{ChangeKind, EventBus, Subscription};
pub use models::{Piece, PieceDraft, ReportEntry, Status, User};
pub use report::{ReportHeader, ReportRow};
pub use repository::Repository;
