use axum::extract::ws::Message;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of one accepted WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a registered connection. `Connecting` lives entirely inside
/// the HTTP upgrade, so a handle only ever reports `Open` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Handle to one live subscriber.
///
/// The connection's writer task owns the socket sink; `outbound` is the only
/// way to enqueue frames for it. Cancelling `closer` tears the connection down.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    outbound: mpsc::Sender<Message>,
    closer: CancellationToken,
}

impl SubscriberHandle {
    pub fn new(outbound: mpsc::Sender<Message>, closer: CancellationToken) -> Self {
        Self {
            id: SubscriberId::new(),
            outbound,
            closer,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn outbound(&self) -> &mpsc::Sender<Message> {
        &self.outbound
    }

    /// Move the connection to `Closed`. Safe to call any number of times.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn state(&self) -> ConnectionState {
        if self.closer.is_cancelled() || self.outbound.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Resolves once the handle has been closed.
    pub async fn closed(&self) {
        self.closer.cancelled().await
    }
}

/// Set of live subscribers, keyed by id.
///
/// Cheap to clone; all clones share the same map. Synchronisation is internal
/// (sharded locks in `DashMap`) and no lock outlives a single call.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<SubscriberId, SubscriberHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Re-adding the same handle replaces it in place.
    /// Returns `false` without inserting if the handle is already closed.
    pub fn add(&self, handle: SubscriberHandle) -> bool {
        if handle.state() == ConnectionState::Closed {
            tracing::debug!(subscriber_id = %handle.id(), "Refusing to register closed subscriber");
            return false;
        }
        let id = handle.id();
        self.inner.insert(id, handle);
        tracing::debug!(
            subscriber_id = %id,
            connections = self.inner.len(),
            "Subscriber registered"
        );
        true
    }

    /// Remove a handle if present. Returns whether this call removed it;
    /// removing an absent id is a no-op.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.inner.remove(id).is_some();
        if removed {
            tracing::debug!(
                subscriber_id = %id,
                connections = self.inner.len(),
                "Subscriber unregistered"
            );
        }
        removed
    }

    /// Point-in-time copy of all registered handles. The map is not locked
    /// once this returns, so delivery can block without stalling `add`/`remove`.
    pub fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_handle() -> (SubscriberHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (SubscriberHandle::new(tx, CancellationToken::new()), rx)
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();

        assert!(registry.add(handle.clone()));
        assert!(registry.add(handle.clone()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&handle.id()));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();

        assert!(!registry.remove(&handle.id()));
        registry.add(handle.clone());
        assert!(registry.remove(&handle.id()));
        assert!(!registry.remove(&handle.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_excludes_removed_handles() {
        let registry = ConnectionRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| open_handle()).collect();
        for (handle, _) in &handles {
            registry.add(handle.clone());
        }

        registry.remove(&handles[1].0.id());
        registry.remove(&handles[3].0.id());

        let ids: Vec<_> = registry.snapshot().iter().map(|h| h.id()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&handles[1].0.id()));
        assert!(!ids.contains(&handles[3].0.id()));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_mutation() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = open_handle();
        let (b, _rx_b) = open_handle();
        registry.add(a.clone());

        let snapshot = registry.snapshot();
        registry.add(b);
        registry.remove(&a.id());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_closed_handle_cannot_be_readded() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();
        registry.add(handle.clone());

        handle.close();
        registry.remove(&handle.id());

        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!registry.add(handle.clone()));
        assert!(!registry.contains(&handle.id()));
    }

    #[test]
    fn test_dropped_receiver_reports_closed() {
        let (handle, rx) = open_handle();
        assert_eq!(handle.state(), ConnectionState::Open);
        drop(rx);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_remove_snapshot() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();

        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = open_handle();
                registry.add(handle.clone());
                tokio::task::yield_now().await;
                let _ = registry.snapshot();
                registry.remove(&handle.id());
                assert!(!registry.snapshot().iter().any(|h| h.id() == handle.id()));
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
