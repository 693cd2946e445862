use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Message log

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message TEXT NOT NULL,
    time TEXT NOT NULL,
    user_id TEXT NOT NULL,
    user_info TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_messages_time ON messages(time);
CREATE INDEX idx_messages_user_time ON messages(user_id, time);
CREATE INDEX idx_messages_created_at ON messages(created_at);
",
    )])
}
