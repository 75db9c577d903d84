//! Persistence module split across logical submodules: one per table plus the
//! shared report query.

mod connection;
mod pieces;
mod query;
mod statuses;
#[cfg(test)]
pub(crate) mod test_utils;
mod users;

pub use connection::{ensure_schema, Store, Table};
pub use pieces::{fetch_pieces, find_piece, upsert_piece, PieceFilter};
pub use query::{
    end_of_day, query_report, start_of_day, ReportCriteria, ReportOrder, SortDirection, SortKey,
};
pub use statuses::{create_status, delete_status, fetch_status_name, fetch_statuses, rename_status};
pub use users::{create_user, delete_user, fetch_user_name, fetch_users, update_user};
