use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use uuid::Uuid;

use rouse_types::models::{MorningCall, MorningCallStatus, Relationship, User};

use crate::Database;
use crate::models::{MorningCallRow, RelationshipRow, UserRow, encode_time};
use crate::repository::{
    MorningCallRepository, RelationshipRepository, StoreError, StoreResult, UserRepository,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";
const RELATIONSHIP_COLUMNS: &str =
    "id, requester_id, receiver_id, status, blocked_by, created_at, updated_at";
const MORNING_CALL_COLUMNS: &str =
    "id, sender_id, receiver_id, scheduled_time, message, status, created_at, updated_at";

/// Translate constraint failures into repository semantics.
/// `unique` names what collided; foreign key failures mean a missing user.
fn constraint_error(err: rusqlite::Error, unique: impl Fn(&str) -> &'static str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, ref msg) = err {
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return StoreError::AlreadyExists(unique(msg.as_deref().unwrap_or_default()));
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return StoreError::NotFound("user"),
            _ => {}
        }
    }
    err.into()
}

fn expect_affected(affected: usize, what: &'static str) -> StoreResult<()> {
    if affected == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

// -- Users --

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<User> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], user_row).optional()?;
    match row {
        Some(row) => Ok(User::try_from(row)?),
        None => Err(StoreError::NotFound("user")),
    }
}

fn user_exists(conn: &Connection, column: &str, value: &str) -> StoreResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {} = ?1)", column);
    Ok(conn.query_row(&sql, [value], |row| row.get(0))?)
}

fn user_collision(msg: &str) -> &'static str {
    if msg.contains("users.email") {
        "email"
    } else if msg.contains("users.username") {
        "username"
    } else {
        "user"
    }
}

impl UserRepository for Database {
    fn create(&self, user: &User) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.password_hash,
                    encode_time(user.created_at),
                    encode_time(user.updated_at),
                ],
            )
            .map_err(|e| constraint_error(e, user_collision))?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<User> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    fn find_by_username(&self, username: &str) -> StoreResult<User> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    fn find_by_email(&self, email: &str) -> StoreResult<User> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    fn exists_by_username(&self, username: &str) -> StoreResult<bool> {
        self.with_conn(|conn| user_exists(conn, "username", username))
    }

    fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        self.with_conn(|conn| user_exists(conn, "email", email))
    }

    fn update(&self, user: &User) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE users SET username = ?2, email = ?3, password_hash = ?4, updated_at = ?5
                     WHERE id = ?1",
                    params![
                        user.id.to_string(),
                        user.username,
                        user.email,
                        user.password_hash,
                        encode_time(user.updated_at),
                    ],
                )
                .map_err(|e| constraint_error(e, user_collision))?;
            expect_affected(affected, "user")
        })
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            expect_affected(affected, "user")
        })
    }
}

// -- Relationships --

fn relationship_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: row.get(3)?,
        blocked_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_relationships<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> StoreResult<Vec<Relationship>> {
    let sql = format!(
        "SELECT {} FROM relationships {} ORDER BY created_at",
        RELATIONSHIP_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, relationship_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| Relationship::try_from(row).map_err(StoreError::from))
        .collect()
}

impl RelationshipRepository for Database {
    fn create(&self, relationship: &Relationship) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relationships (id, requester_id, receiver_id, status, blocked_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    relationship.id.to_string(),
                    relationship.requester_id.to_string(),
                    relationship.receiver_id.to_string(),
                    relationship.status.as_str(),
                    relationship.blocked_by.map(|id| id.to_string()),
                    encode_time(relationship.created_at),
                    encode_time(relationship.updated_at),
                ],
            )
            .map_err(|e| constraint_error(e, |_| "relationship"))?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<Relationship> {
        self.with_conn(|conn| {
            query_relationships(conn, "WHERE id = ?1", [id.to_string()])?
                .pop()
                .ok_or(StoreError::NotFound("relationship"))
        })
    }

    fn update(&self, relationship: &Relationship) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE relationships SET status = ?2, blocked_by = ?3, updated_at = ?4 WHERE id = ?1",
                    params![
                        relationship.id.to_string(),
                        relationship.status.as_str(),
                        relationship.blocked_by.map(|id| id.to_string()),
                        encode_time(relationship.updated_at),
                    ],
                )
                .map_err(|e| constraint_error(e, |_| "relationship"))?;
            expect_affected(affected, "relationship")
        })
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM relationships WHERE id = ?1", [id.to_string()])?;
            expect_affected(affected, "relationship")
        })
    }

    fn list_all(&self) -> StoreResult<Vec<Relationship>> {
        self.with_conn(|conn| query_relationships(conn, "", params![]))
    }

    fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Relationship>> {
        self.with_conn(|conn| {
            query_relationships(
                conn,
                "WHERE requester_id = ?1 OR receiver_id = ?1",
                [user_id.to_string()],
            )
        })
    }

    fn find_active_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Relationship>> {
        self.with_conn(|conn| {
            Ok(query_relationships(
                conn,
                "WHERE ((requester_id = ?1 AND receiver_id = ?2) OR (requester_id = ?2 AND receiver_id = ?1))
                   AND status IN ('pending', 'accepted', 'blocked')",
                [a.to_string(), b.to_string()],
            )?
            .pop())
        })
    }
}

// -- Morning calls --

fn morning_call_row(row: &Row<'_>) -> rusqlite::Result<MorningCallRow> {
    Ok(MorningCallRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        scheduled_time: row.get(3)?,
        message: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_morning_calls<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> StoreResult<Vec<MorningCall>> {
    let sql = format!(
        "SELECT {} FROM morning_calls {} ORDER BY scheduled_time",
        MORNING_CALL_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, morning_call_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| MorningCall::try_from(row).map_err(StoreError::from))
        .collect()
}

impl MorningCallRepository for Database {
    fn create(&self, call: &MorningCall) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO morning_calls (id, sender_id, receiver_id, scheduled_time, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    call.id.to_string(),
                    call.sender_id.to_string(),
                    call.receiver_id.to_string(),
                    encode_time(call.scheduled_time),
                    call.message,
                    call.status.as_str(),
                    encode_time(call.created_at),
                    encode_time(call.updated_at),
                ],
            )
            .map_err(|e| constraint_error(e, |_| "morning call"))?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<MorningCall> {
        self.with_conn(|conn| {
            query_morning_calls(conn, "WHERE id = ?1", [id.to_string()])?
                .pop()
                .ok_or(StoreError::NotFound("morning call"))
        })
    }

    fn update(&self, call: &MorningCall) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE morning_calls SET scheduled_time = ?2, message = ?3, status = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    call.id.to_string(),
                    encode_time(call.scheduled_time),
                    call.message,
                    call.status.as_str(),
                    encode_time(call.updated_at),
                ],
            )?;
            expect_affected(affected, "morning call")
        })
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM morning_calls WHERE id = ?1", [id.to_string()])?;
            expect_affected(affected, "morning call")
        })
    }

    fn list_all(&self) -> StoreResult<Vec<MorningCall>> {
        self.with_conn(|conn| query_morning_calls(conn, "", params![]))
    }

    fn list_by_sender(&self, sender_id: Uuid) -> StoreResult<Vec<MorningCall>> {
        self.with_conn(|conn| {
            query_morning_calls(conn, "WHERE sender_id = ?1", [sender_id.to_string()])
        })
    }

    fn list_by_receiver(&self, receiver_id: Uuid) -> StoreResult<Vec<MorningCall>> {
        self.with_conn(|conn| {
            query_morning_calls(conn, "WHERE receiver_id = ?1", [receiver_id.to_string()])
        })
    }

    fn list_by_status(&self, status: MorningCallStatus) -> StoreResult<Vec<MorningCall>> {
        self.with_conn(|conn| query_morning_calls(conn, "WHERE status = ?1", [status.as_str()]))
    }
}
