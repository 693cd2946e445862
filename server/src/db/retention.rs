//! Background retention sweep for the message log.
//!
//! Coarse by construction: rows are deleted only when a sweep runs, so with
//! equal retention and interval a row can outlive the window by up to one
//! interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::db::{messages, run_blocking, DbPool, StoreError};

/// Periodically deletes messages older than `retention`.
#[derive(Clone)]
pub struct RetentionSweeper {
    db: DbPool,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, retention: Duration, interval: Duration) -> Self {
        Self {
            db,
            clock,
            retention,
            interval,
        }
    }

    /// Rows accepted strictly before this instant (unix millis) are expired.
    pub fn cutoff_millis(&self) -> i64 {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::TimeDelta::MAX);
        self.clock
            .now()
            .checked_sub_signed(retention)
            .map(|cutoff| cutoff.timestamp_millis())
            .unwrap_or(i64::MIN)
    }

    /// Run one sweep now. Returns the number of purged messages.
    pub async fn sweep_once(&self) -> Result<usize, StoreError> {
        let cutoff = self.cutoff_millis();
        run_blocking(&self.db, move |conn| messages::delete_older_than(conn, cutoff)).await
    }

    /// Spawn the sweep loop. The first sweep runs one `interval` after start;
    /// the loop exits when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Message retention sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => match self.sweep_once().await {
                        Ok(count) if count > 0 => {
                            tracing::info!("Message retention cleanup: purged {} expired messages", count);
                        }
                        Ok(_) => {
                            tracing::debug!("Message retention cleanup: no expired messages");
                        }
                        Err(e) => {
                            tracing::error!("Message retention cleanup error: {}", e);
                        }
                    }
                }
            }
        })
    }
}
