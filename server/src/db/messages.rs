//! Durable message log queries.
//!
//! All functions take a plain `&Connection`; async callers go through
//! [`super::run_blocking`].

use rusqlite::{params, Connection, Row};

use super::models::StoredMessage;
use super::StoreError;
use crate::chat::{ChatMessage, UserInfo};

/// Append an accepted message. Returns the new row id.
pub fn insert_message(
    conn: &Connection,
    message: &ChatMessage,
    created_at_millis: i64,
) -> Result<i64, StoreError> {
    let user_info = serde_json::to_string(&message.user_info).map_err(StoreError::Encode)?;
    conn.execute(
        "INSERT INTO messages (message, time, user_id, user_info, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.message,
            message.time,
            message.user_info.user_id,
            user_info,
            created_at_millis,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest `limit` messages, ordered by `time` descending.
pub fn recent_messages(conn: &Connection, limit: u32) -> Result<Vec<StoredMessage>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, message, time, user_info, created_at FROM messages
         ORDER BY time DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], raw_row)?;
    decode_rows(rows)
}

/// Up to `limit` messages from `user_id` with `time` strictly before
/// `before`, ordered by `time` descending.
pub fn messages_before(
    conn: &Connection,
    before: &str,
    user_id: &str,
    limit: u32,
) -> Result<Vec<StoredMessage>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, message, time, user_info, created_at FROM messages
         WHERE time < ?1 AND user_id = ?2
         ORDER BY time DESC, id DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![before, user_id, limit], raw_row)?;
    decode_rows(rows)
}

/// Delete every message accepted before `cutoff_millis`. Returns the number
/// of rows removed.
pub fn delete_older_than(conn: &Connection, cutoff_millis: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM messages WHERE created_at < ?1",
        params![cutoff_millis],
    )?)
}

pub fn count_messages(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
}

struct RawRow {
    id: i64,
    message: String,
    time: String,
    user_info: String,
    created_at: i64,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        message: row.get(1)?,
        time: row.get(2)?,
        user_info: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn decode_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<StoredMessage>, StoreError> {
    rows.map(|row| {
        let row = row?;
        let user_info: UserInfo =
            serde_json::from_str(&row.user_info).map_err(StoreError::Decode)?;
        Ok(StoredMessage {
            id: row.id,
            message: ChatMessage {
                message: row.message,
                time: row.time,
                user_info,
            },
            created_at: row.created_at,
        })
    })
    .collect()
}
