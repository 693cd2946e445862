pub mod messages;
pub mod migrations;
pub mod models;
pub mod retention;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous; we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Errors from the durable message log.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite returned an error
    Database(rusqlite::Error),
    /// The connection mutex was poisoned
    Lock,
    /// A stored publisher identity could not be decoded
    Decode(serde_json::Error),
    /// A publisher identity could not be encoded for storage
    Encode(serde_json::Error),
    /// The blocking DB task panicked or was cancelled
    Join(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Lock => write!(f, "Database lock poisoned"),
            Self::Decode(e) => write!(f, "Failed to decode stored userInfo: {}", e),
            Self::Encode(e) => write!(f, "Failed to encode userInfo: {}", e),
            Self::Join(e) => write!(f, "Database task failed: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e)
    }
}

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("relay.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let migrations = migrations::migrations();
    migrations.to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Run a blocking store operation off the async runtime.
pub async fn run_blocking<T, F>(db: &DbPool, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StoreError::Lock)?;
        op(&*conn)
    })
    .await
    .map_err(|e| StoreError::Join(e.to_string()))?
}
