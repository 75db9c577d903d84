use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::connection::{
    format_timestamp, is_foreign_key_violation, optional_uuid_column, timestamp_column,
};
use crate::db::query::{query_report, ReportCriteria};
use crate::error::{Error, Result};
use crate::models::{Piece, PieceDraft};

/// Filters offered by the interactive piece list. A subset of the report
/// criteria, always ordered newest registration first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceFilter {
    /// Case-sensitive substring of the code.
    pub code_contains: Option<String>,
    pub user_id: Option<Uuid>,
    pub status_id: Option<Uuid>,
}

impl From<&PieceFilter> for ReportCriteria {
    fn from(filter: &PieceFilter) -> Self {
        Self {
            code_contains: filter.code_contains.clone(),
            user_id: filter.user_id,
            status_id: filter.status_id,
            ..Self::default()
        }
    }
}

/// Columns of `Pieces` that point at other tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PieceReference {
    User,
    Status,
}

impl PieceReference {
    fn count_sql(self) -> &'static str {
        match self {
            Self::User => "SELECT COUNT(1) FROM Pieces WHERE UserId = ?1",
            Self::Status => "SELECT COUNT(1) FROM Pieces WHERE StatusId = ?1",
        }
    }
}

/// Number of pieces pointing at `id` through `reference`.
pub(crate) fn count_references(conn: &Connection, reference: PieceReference, id: Uuid) -> Result<i64> {
    let count = conn.query_row(reference.count_sql(), params![id.to_string()], |row| row.get(0))?;
    Ok(count)
}

/// Map the first six projected columns (Code, Description, UserId, StatusId,
/// PhotoPath, RegisteredAt) onto a [`Piece`].
pub(crate) fn piece_from_row(row: &Row<'_>) -> rusqlite::Result<Piece> {
    Ok(Piece {
        code: row.get(0)?,
        description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        user_id: optional_uuid_column(row, 2)?,
        status_id: optional_uuid_column(row, 3)?,
        photo_path: row.get(4)?,
        registered_at: timestamp_column(row, 5)?,
    })
}

/// List pieces matching the optional filters, newest first. Runs through the
/// same query builder as reports.
pub fn fetch_pieces(conn: &Connection, filter: &PieceFilter) -> Result<Vec<Piece>> {
    let entries = query_report(conn, &ReportCriteria::from(filter))?;
    Ok(entries.into_iter().map(|entry| entry.piece).collect())
}

/// Look up a piece by code. Surrounding whitespace is ignored, matching how
/// codes are stored.
pub fn find_piece(conn: &Connection, code: &str) -> Result<Option<Piece>> {
    let piece = conn
        .query_row(
            "SELECT Code, Description, UserId, StatusId, PhotoPath, RegisteredAt
             FROM Pieces WHERE Code = ?1",
            params![code.trim()],
            piece_from_row,
        )
        .optional()?;
    Ok(piece)
}

/// Insert a piece or overwrite the editable fields of the existing one with the
/// same code. `now` becomes the registration time only when a row is inserted.
/// The code is trimmed before it is stored or matched.
#[instrument(skip(conn, draft), fields(code = %draft.code.trim()))]
pub fn upsert_piece(conn: &mut Connection, draft: &PieceDraft, now: NaiveDateTime) -> Result<Piece> {
    let code = draft.code.trim();
    if code.is_empty() {
        return Err(Error::validation("Piece code is required."));
    }
    let photo_path = draft
        .photo_path
        .as_deref()
        .filter(|path| !path.trim().is_empty());

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existed = find_piece(&tx, code)?.is_some();

    tx.execute(
        "INSERT INTO Pieces (Code, Description, UserId, StatusId, PhotoPath, RegisteredAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(Code) DO UPDATE SET
            Description = excluded.Description,
            UserId = excluded.UserId,
            StatusId = excluded.StatusId,
            PhotoPath = excluded.PhotoPath",
        params![
            code,
            draft.description,
            draft.user_id.map(|id| id.to_string()),
            draft.status_id.map(|id| id.to_string()),
            photo_path,
            format_timestamp(&now),
        ],
    )
    .map_err(|err| {
        if is_foreign_key_violation(&err) {
            warn!("piece references a missing user or status");
            Error::ReferentialIntegrity(
                "The assigned user or status no longer exists.".to_string(),
            )
        } else {
            err.into()
        }
    })?;

    let stored = find_piece(&tx, code)?
        .ok_or_else(|| Error::not_found(format!("Piece {code} vanished during save.")))?;
    tx.commit()?;

    if existed {
        info!("updated piece");
    } else {
        info!("registered piece");
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{
        at, direct_insert_status, direct_insert_user, init_test_tracing, temp_store,
    };

    #[test]
    fn insert_then_find() {
        init_test_tracing();
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let now = at(2024, 6, 1, 12, 0);

        let stored = upsert_piece(&mut conn, &PieceDraft::new("P-100"), now).unwrap();
        assert_eq!(stored.code, "P-100");
        assert_eq!(stored.description, "");
        assert_eq!(stored.user_id, None);
        assert_eq!(stored.status_id, None);
        assert_eq!(stored.registered_at, now);

        assert_eq!(find_piece(&conn, "P-100").unwrap(), Some(stored));
        assert_eq!(find_piece(&conn, "P-404").unwrap(), None);
    }

    #[test]
    fn repeated_upsert_keeps_one_row_and_first_timestamp() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let user = direct_insert_user(&conn, "Alice", None);
        let status = direct_insert_status(&conn, "Done");
        let draft = PieceDraft::new("P-7")
            .description("hinge")
            .user(Some(user))
            .status(Some(status))
            .photo(Some("/photos/p7.jpg".into()));

        let first = upsert_piece(&mut conn, &draft, at(2024, 6, 1, 8, 0)).unwrap();
        let second = upsert_piece(&mut conn, &draft, at(2024, 6, 2, 17, 45)).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.registered_at, at(2024, 6, 1, 8, 0));
        let count: i64 = conn
            .query_row("SELECT COUNT(1) FROM Pieces", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn update_overwrites_editable_fields() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let user = direct_insert_user(&conn, "Alice", None);
        let draft = PieceDraft::new("P-8")
            .description("before")
            .user(Some(user))
            .photo(Some("/photos/old.png".into()));
        upsert_piece(&mut conn, &draft, at(2024, 6, 1, 8, 0)).unwrap();

        let cleared = PieceDraft::new("P-8").description("after").photo(Some("  ".into()));
        let stored = upsert_piece(&mut conn, &cleared, at(2024, 7, 1, 8, 0)).unwrap();
        assert_eq!(stored.description, "after");
        assert_eq!(stored.user_id, None);
        assert_eq!(stored.photo_path, None);
        assert_eq!(stored.registered_at, at(2024, 6, 1, 8, 0));
    }

    #[test]
    fn codes_are_trimmed_before_matching() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        upsert_piece(&mut conn, &PieceDraft::new("P-1").description("first"), at(2024, 6, 1, 8, 0))
            .unwrap();

        let stored = upsert_piece(
            &mut conn,
            &PieceDraft::new(" P-1 ").description("second"),
            at(2024, 6, 2, 8, 0),
        )
        .unwrap();
        assert_eq!(stored.code, "P-1");
        assert_eq!(stored.description, "second");
        assert_eq!(stored.registered_at, at(2024, 6, 1, 8, 0));

        let pieces = fetch_pieces(&conn, &PieceFilter::default()).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(find_piece(&conn, "  P-1\t").unwrap().map(|piece| piece.code), Some("P-1".to_string()));
    }

    #[test]
    fn blank_code_is_rejected() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let err = upsert_piece(&mut conn, &PieceDraft::new("  "), at(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let draft = PieceDraft::new("P-X").user(Some(Uuid::new_v4()));
        let err = upsert_piece(&mut conn, &draft, at(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::ReferentialIntegrity(_)), "got {err:?}");
        assert_eq!(find_piece(&conn, "P-X").unwrap(), None);
    }

    #[test]
    fn list_filters_by_code_user_and_status() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let alice = direct_insert_user(&conn, "Alice", None);
        let done = direct_insert_status(&conn, "Done");

        upsert_piece(&mut conn, &PieceDraft::new("AX-1").user(Some(alice)), at(2024, 1, 1, 8, 0)).unwrap();
        upsert_piece(&mut conn, &PieceDraft::new("AX-2").status(Some(done)), at(2024, 1, 2, 8, 0)).unwrap();
        upsert_piece(
            &mut conn,
            &PieceDraft::new("BX-1").user(Some(alice)).status(Some(done)),
            at(2024, 1, 3, 8, 0),
        )
        .unwrap();

        let codes = |filter: PieceFilter| -> Vec<String> {
            fetch_pieces(&conn, &filter)
                .unwrap()
                .into_iter()
                .map(|piece| piece.code)
                .collect()
        };

        assert_eq!(codes(PieceFilter::default()), vec!["BX-1", "AX-2", "AX-1"]);
        assert_eq!(
            codes(PieceFilter {
                code_contains: Some("AX".into()),
                ..PieceFilter::default()
            }),
            vec!["AX-2", "AX-1"]
        );
        assert!(codes(PieceFilter {
            code_contains: Some("ax".into()),
            ..PieceFilter::default()
        })
        .is_empty());
        assert_eq!(
            codes(PieceFilter {
                user_id: Some(alice),
                status_id: Some(done),
                ..PieceFilter::default()
            }),
            vec!["BX-1"]
        );
    }

    #[test]
    fn reference_counts_follow_assignments() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let alice = direct_insert_user(&conn, "Alice", None);
        assert_eq!(count_references(&conn, PieceReference::User, alice).unwrap(), 0);

        upsert_piece(&mut conn, &PieceDraft::new("P-1").user(Some(alice)), at(2024, 1, 1, 8, 0)).unwrap();
        upsert_piece(&mut conn, &PieceDraft::new("P-2").user(Some(alice)), at(2024, 1, 1, 9, 0)).unwrap();
        assert_eq!(count_references(&conn, PieceReference::User, alice).unwrap(), 2);
        assert_eq!(count_references(&conn, PieceReference::Status, alice).unwrap(), 0);
    }
}
