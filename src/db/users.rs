use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::connection::{is_unique_violation, uuid_column};
use crate::db::pieces::{count_references, PieceReference};
use crate::error::{Error, Result};
use crate::models::User;

/// Retrieve every user ordered by display name.
pub fn fetch_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT Id, Name, Username FROM Users ORDER BY Name")?;

    let users = stmt
        .query_map([], |row| {
            Ok(User {
                id: uuid_column(row, 0)?,
                name: row.get(1)?,
                username: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(users)
}

/// Resolve a user's display name. Missing ids resolve to `None`.
pub fn fetch_user_name(conn: &Connection, id: Uuid) -> Result<Option<String>> {
    let name = conn
        .query_row(
            "SELECT Name FROM Users WHERE Id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}

/// Insert a new user. The name is required; a blank username is stored as
/// NULL so any number of users may go without one.
#[instrument(skip(conn))]
pub fn create_user(conn: &Connection, name: &str, username: Option<&str>) -> Result<User> {
    let name = required_name(name)?;
    let username = normalize_username(username);
    let id = Uuid::new_v4();

    conn.execute(
        "INSERT INTO Users (Id, Name, Username) VALUES (?1, ?2, ?3)",
        params![id.to_string(), name, username],
    )
    .map_err(|err| map_username_conflict(err, username.as_deref()))?;

    info!(%id, "created user");
    Ok(User {
        id,
        name: name.to_string(),
        username,
    })
}

/// Overwrite the name and username of an existing user.
#[instrument(skip(conn))]
pub fn update_user(conn: &Connection, id: Uuid, name: &str, username: Option<&str>) -> Result<()> {
    if id.is_nil() {
        return Err(Error::validation("Select a user first."));
    }
    let name = required_name(name)?;
    let username = normalize_username(username);

    let updated = conn
        .execute(
            "UPDATE Users SET Name = ?1, Username = ?2 WHERE Id = ?3",
            params![name, username, id.to_string()],
        )
        .map_err(|err| map_username_conflict(err, username.as_deref()))?;

    if updated == 0 {
        return Err(Error::not_found("User not found."));
    }
    info!(%id, "updated user");
    Ok(())
}

/// Delete a user that no piece references. The reference check and the delete
/// share one immediate transaction, so no piece can be assigned to the user in
/// between.
#[instrument(skip(conn))]
pub fn delete_user(conn: &mut Connection, id: Uuid) -> Result<()> {
    if id.is_nil() {
        return Err(Error::validation("Select a user first."));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let references = count_references(&tx, PieceReference::User, id)?;
    if references > 0 {
        warn!(%id, references, "refusing to delete assigned user");
        return Err(Error::ReferentialIntegrity(format!(
            "Cannot delete: the user is assigned to {references} piece(s)."
        )));
    }

    let deleted = tx.execute("DELETE FROM Users WHERE Id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(Error::not_found("User not found."));
    }
    tx.commit()?;

    info!(%id, "deleted user");
    Ok(())
}

fn required_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(Error::validation("Name is required."))
    } else {
        Ok(name)
    }
}

pub(crate) fn normalize_username(username: Option<&str>) -> Option<String> {
    username
        .map(str::trim)
        .filter(|username| !username.is_empty())
        .map(str::to_string)
}

/// The partial unique index on `Users.Username` is the only uniqueness rule on
/// this table, so any unique violation is a username collision.
fn map_username_conflict(err: rusqlite::Error, username: Option<&str>) -> Error {
    if is_unique_violation(&err) {
        Error::Conflict(format!(
            "Username '{}' already exists. Choose another.",
            username.unwrap_or_default()
        ))
    } else {
        err.into()
    }
}
