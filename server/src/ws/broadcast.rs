use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;
use futures_util::future::join_all;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::registry::{ConnectionRegistry, SubscriberHandle, SubscriberId};
use crate::chat::ChatMessage;

/// An encoded message ready to be written to every subscriber.
///
/// Encoded once; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct Payload(Utf8Bytes);

impl Payload {
    pub fn encode(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        Ok(Self(Utf8Bytes::from(serde_json::to_string(message)?)))
    }

    /// Wrap bytes received from a broker without copying them. Fails on
    /// non UTF-8 input.
    pub fn from_utf8(bytes: Bytes) -> Result<Self, std::str::Utf8Error> {
        Ok(Self(Utf8Bytes::try_from(bytes)?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The encoded frame as raw bytes, sharing the payload's buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.0.clone())
    }

    fn frame(&self) -> Message {
        Message::Text(self.0.clone())
    }
}

/// Result of one delivery attempt to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The connection's writer is gone.
    Closed,
    /// The connection's outbound queue stayed full for the whole write timeout.
    TimedOut,
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Aggregate of one `broadcast` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: Vec<(SubscriberId, DeliveryOutcome)>,
}

/// Fans payloads out to every subscriber in a `ConnectionRegistry`.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Deliver `payload` to every currently registered subscriber.
    ///
    /// Attempts run concurrently and independently. A subscriber whose
    /// delivery fails is closed and removed from the registry; the failure
    /// is reported in the returned `BroadcastReport` and never aborts the
    /// remaining deliveries.
    pub async fn broadcast(&self, payload: &Payload) -> BroadcastReport {
        let recipients = self.registry.snapshot();
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..Default::default()
        };
        if recipients.is_empty() {
            tracing::debug!("Broadcast with no subscribers");
            return report;
        }

        let attempts = recipients.into_iter().map(|handle| async move {
            let outcome = self.deliver(&handle, payload).await;
            (handle, outcome)
        });

        for (handle, outcome) in join_all(attempts).await {
            if outcome.is_failure() {
                self.evict(&handle, outcome);
                report.failed.push((handle.id(), outcome));
            } else {
                report.delivered += 1;
            }
        }

        tracing::debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }

    async fn deliver(&self, handle: &SubscriberHandle, payload: &Payload) -> DeliveryOutcome {
        match handle
            .outbound()
            .send_timeout(payload.frame(), self.write_timeout)
            .await
        {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(SendTimeoutError::Closed(_)) => DeliveryOutcome::Closed,
            Err(SendTimeoutError::Timeout(_)) => DeliveryOutcome::TimedOut,
        }
    }

    fn evict(&self, handle: &SubscriberHandle, outcome: DeliveryOutcome) {
        tracing::warn!(
            subscriber_id = %handle.id(),
            outcome = ?outcome,
            "Delivery failed, dropping subscriber"
        );
        handle.close();
        self.registry.remove(&handle.id());
    }
}
