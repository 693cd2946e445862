//! Broker bridge: decouples accepting a publish from fanning it out.
//!
//! The ingress side only needs a [`Publisher`]; the broadcasting side only
//! needs a [`PayloadSource`]. [`run_consumer`] is the single loop that feeds
//! consumed payloads to the [`Broadcaster`].

pub mod local;
pub mod nats;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::ws::{Broadcaster, Payload};

/// Errors from a broker transport.
#[derive(Debug)]
pub enum BrokerError {
    /// Could not connect or subscribe at startup
    Connect(String),
    /// Publishing a payload failed
    Publish(String),
    /// The queue is gone (consumer side dropped)
    Closed,
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "Broker connection failed: {}", e),
            Self::Publish(e) => write!(f, "Broker publish failed: {}", e),
            Self::Closed => write!(f, "Broker queue closed"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Accepts encoded payloads for later fan-out.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<(), BrokerError>;
}

/// Yields payloads to broadcast. `None` means the source is exhausted.
#[async_trait]
pub trait PayloadSource: Send {
    async fn next_payload(&mut self) -> Option<Bytes>;
}

/// Drain `source` into `broadcaster` until the source ends or `shutdown`
/// is cancelled. Returns the number of payloads broadcast.
pub async fn run_consumer<S>(mut source: S, broadcaster: Broadcaster, shutdown: CancellationToken) -> u64
where
    S: PayloadSource,
{
    let mut consumed = 0u64;
    tracing::info!("Broker consumer started");

    loop {
        let bytes = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = source.next_payload() => match next {
                Some(bytes) => bytes,
                None => {
                    tracing::warn!("Broker source ended");
                    break;
                }
            }
        };

        let payload = match Payload::from_utf8(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping non UTF-8 broker payload");
                continue;
            }
        };

        let report = broadcaster.broadcast(&payload).await;
        consumed += 1;
        tracing::debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast consumed payload"
        );
    }

    tracing::info!(consumed, "Broker consumer stopped");
    consumed
}
