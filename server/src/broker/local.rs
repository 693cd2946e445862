//! In-process broker: a bounded queue between publishers and one consumer.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BrokerError, PayloadSource, Publisher};

/// Create a connected publisher/source pair holding at most `capacity`
/// undelivered payloads. Publishers wait while the queue is full.
pub fn channel(capacity: usize) -> (LocalPublisher, LocalSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LocalPublisher { tx }, LocalSource { rx })
}

#[derive(Debug, Clone)]
pub struct LocalPublisher {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, payload: Bytes) -> Result<(), BrokerError> {
        self.tx.send(payload).await.map_err(|_| BrokerError::Closed)
    }
}

#[derive(Debug)]
pub struct LocalSource {
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl PayloadSource for LocalSource {
    async fn next_payload(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
