use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS relationships (
            id              TEXT PRIMARY KEY,
            requester_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status          TEXT NOT NULL,
            blocked_by      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK (requester_id <> receiver_id)
        );

        -- At most one active relationship per unordered pair
        CREATE UNIQUE INDEX IF NOT EXISTS idx_relationships_active_pair
            ON relationships(MIN(requester_id, receiver_id), MAX(requester_id, receiver_id))
            WHERE status IN ('pending', 'accepted', 'blocked');

        CREATE INDEX IF NOT EXISTS idx_relationships_requester
            ON relationships(requester_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_receiver
            ON relationships(receiver_id);

        CREATE TABLE IF NOT EXISTS morning_calls (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            scheduled_time  TEXT NOT NULL,
            message         TEXT NOT NULL,
            status          TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK (sender_id <> receiver_id)
        );

        CREATE INDEX IF NOT EXISTS idx_morning_calls_status_time
            ON morning_calls(status, scheduled_time);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
