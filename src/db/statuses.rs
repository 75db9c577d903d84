use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::connection::uuid_column;
use crate::db::pieces::{count_references, PieceReference};
use crate::error::{Error, Result};
use crate::models::Status;

/// Retrieve every status ordered by name.
pub fn fetch_statuses(conn: &Connection) -> Result<Vec<Status>> {
    let mut stmt = conn.prepare("SELECT Id, Name FROM Statuses ORDER BY Name")?;

    let statuses = stmt
        .query_map([], |row| {
            Ok(Status {
                id: uuid_column(row, 0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(statuses)
}

pub fn fetch_status_name(conn: &Connection, id: Uuid) -> Result<Option<String>> {
    let name = conn
        .query_row(
            "SELECT Name FROM Statuses WHERE Id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}

/// Insert a status. Unlike users, a blank name is silently ignored and
/// reported as `Ok(None)` rather than as a validation error.
#[instrument(skip(conn))]
pub fn create_status(conn: &Connection, name: &str) -> Result<Option<Status>> {
    let name = name.trim();
    if name.is_empty() {
        debug!("ignoring blank status name");
        return Ok(None);
    }

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO Statuses (Id, Name) VALUES (?1, ?2)",
        params![id.to_string(), name],
    )?;

    info!(%id, "created status");
    Ok(Some(Status {
        id,
        name: name.to_string(),
    }))
}

#[instrument(skip(conn))]
pub fn rename_status(conn: &Connection, id: Uuid, name: &str) -> Result<()> {
    if id.is_nil() {
        return Err(Error::validation("Select a status first."));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Name is required."));
    }

    let updated = conn.execute(
        "UPDATE Statuses SET Name = ?1 WHERE Id = ?2",
        params![name, id.to_string()],
    )?;
    if updated == 0 {
        return Err(Error::not_found("Status not found."));
    }
    info!(%id, "renamed status");
    Ok(())
}

/// Delete a status no piece uses, under the same single-transaction check as
/// user deletion.
#[instrument(skip(conn))]
pub fn delete_status(conn: &mut Connection, id: Uuid) -> Result<()> {
    if id.is_nil() {
        return Err(Error::validation("Select a status first."));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let references = count_references(&tx, PieceReference::Status, id)?;
    if references > 0 {
        warn!(%id, references, "refusing to delete status in use");
        return Err(Error::ReferentialIntegrity(format!(
            "Cannot delete: the status is used by {references} piece(s)."
        )));
    }

    let deleted = tx.execute("DELETE FROM Statuses WHERE Id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(Error::not_found("Status not found."));
    }
    tx.commit()?;

    info!(%id, "deleted status");
    Ok(())
}
