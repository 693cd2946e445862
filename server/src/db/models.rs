/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use crate::chat::ChatMessage;

/// A persisted message: the accepted message plus its row id and the
/// unix-millis instant it was accepted (what retention is measured against).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub message: ChatMessage,
    pub created_at: i64,
}
