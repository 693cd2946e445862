//! NATS transport for the broker bridge.
//!
//! Core NATS (no JetStream): messages are not persisted, and every consumer
//! subscribes through the same queue group so each payload is broadcast by
//! exactly one consumer process.

use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use super::{BrokerError, PayloadSource, Publisher};
use crate::config::BrokerConfig;

/// Connect to the NATS server named in `config`.
pub async fn connect(config: &BrokerConfig) -> Result<Client, BrokerError> {
    let client = async_nats::connect(&config.url)
        .await
        .map_err(|e| BrokerError::Connect(e.to_string()))?;
    tracing::info!(url = %config.url, subject = %config.subject, "Connected to NATS");
    Ok(client)
}

/// Publishes payloads to a single subject.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    client: Client,
    subject: String,
}

impl NatsPublisher {
    pub fn new(client: Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, payload: Bytes) -> Result<(), BrokerError> {
        self.client
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }
}

/// Queue-group subscription on the relay subject.
pub struct NatsSource {
    subscriber: Subscriber,
}

impl NatsSource {
    pub async fn subscribe(client: &Client, config: &BrokerConfig) -> Result<Self, BrokerError> {
        let subscriber = client
            .queue_subscribe(config.subject.clone(), config.queue_group.clone())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        tracing::info!(
            subject = %config.subject,
            queue_group = %config.queue_group,
            "Subscribed to broker queue"
        );
        Ok(Self { subscriber })
    }
}

#[async_trait]
impl PayloadSource for NatsSource {
    async fn next_payload(&mut self) -> Option<Bytes> {
        self.subscriber.next().await.map(|message| message.payload)
    }
}
