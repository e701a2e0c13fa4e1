//! Database row types. These map directly to SQLite rows and are converted
//! into `rouse_types` models at the query boundary.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rouse_types::models::{MorningCall, Relationship, User};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct RelationshipRow {
    pub id: String,
    pub requester_id: String,
    pub receiver_id: String,
    pub status: String,
    pub blocked_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MorningCallRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub scheduled_time: String,
    pub message: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fixed-width RFC 3339 so lexical order in SQL matches time order.
pub fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt {} '{}'", field, raw))?
        .with_timezone(&Utc))
}

fn decode_id(field: &str, raw: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} '{}'", field, raw))
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: decode_id("user id", &row.id)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            created_at: decode_time("created_at", &row.created_at)?,
            updated_at: decode_time("updated_at", &row.updated_at)?,
        })
    }
}

impl TryFrom<RelationshipRow> for Relationship {
    type Error = anyhow::Error;

    fn try_from(row: RelationshipRow) -> Result<Self> {
        Ok(Relationship {
            id: decode_id("relationship id", &row.id)?,
            requester_id: decode_id("requester_id", &row.requester_id)?,
            receiver_id: decode_id("receiver_id", &row.receiver_id)?,
            status: row.status.parse()?,
            blocked_by: row
                .blocked_by
                .as_deref()
                .map(|raw| decode_id("blocked_by", raw))
                .transpose()?,
            created_at: decode_time("created_at", &row.created_at)?,
            updated_at: decode_time("updated_at", &row.updated_at)?,
        })
    }
}

impl TryFrom<MorningCallRow> for MorningCall {
    type Error = anyhow::Error;

    fn try_from(row: MorningCallRow) -> Result<Self> {
        Ok(MorningCall {
            id: decode_id("morning call id", &row.id)?,
            sender_id: decode_id("sender_id", &row.sender_id)?,
            receiver_id: decode_id("receiver_id", &row.receiver_id)?,
            scheduled_time: decode_time("scheduled_time", &row.scheduled_time)?,
            message: row.message,
            status: row.status.parse()?,
            created_at: decode_time("created_at", &row.created_at)?,
            updated_at: decode_time("updated_at", &row.updated_at)?,
        })
    }
}
