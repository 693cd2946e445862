use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::broker::Publisher;
use crate::clock::{Clock, SystemClock};
use crate::db::DbPool;
use crate::ws::{Broadcaster, ConnectionRegistry};

/// Default number of frames buffered per subscriber.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default /history page size.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live subscriber connections
    pub registry: ConnectionRegistry,
    /// Fans accepted messages out to `registry`
    pub broadcaster: Broadcaster,
    /// Durable message log (durable mode only)
    pub db: Option<DbPool>,
    /// Broker publisher; when set, /send publishes instead of broadcasting
    pub publisher: Option<Arc<dyn Publisher>>,
    /// Time source for persistence timestamps
    pub clock: Arc<dyn Clock>,
    /// Maximum messages returned by /history
    pub history_page_size: u32,
    /// Frames buffered per subscriber
    pub outbound_buffer: usize,
    /// Cancelled on process shutdown; every connection token is a child of it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Direct-broadcast state with no store and no broker.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            registry: broadcaster.registry().clone(),
            broadcaster,
            db: None,
            publisher: None,
            clock: Arc::new(SystemClock),
            history_page_size: DEFAULT_PAGE_SIZE,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_store(mut self, db: DbPool, page_size: u32) -> Self {
        self.db = Some(db);
        self.history_page_size = page_size;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
