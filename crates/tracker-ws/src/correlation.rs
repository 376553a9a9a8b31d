use crate::messages::RpcResponse;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use tracker_core::{Result, TrackerError};

struct PendingSlot {
    // Distinguishes registrations so a stale waiter never removes a newer one
    token: u64,
    tx: oneshot::Sender<RpcResponse>,
}

/// Outstanding requests keyed by request id.
///
/// Each id maps to a one-shot delivery slot. Resolution and cancellation both
/// remove the slot, so a response is delivered at most once.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<DashMap<u64, PendingSlot>>,
    tokens: Arc<AtomicU64>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a delivery slot for `id`. Must happen before the request is sent.
    pub fn register(&self, id: u64) -> Result<Waiter> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(TrackerError::DuplicateRequestId(id)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                let token = self.tokens.fetch_add(1, Ordering::Relaxed);
                vacant.insert(PendingSlot { token, tx });
                Ok(Waiter {
                    id,
                    token,
                    rx,
                    pending: self.pending.clone(),
                })
            }
        }
    }

    /// Deliver a response to its waiter. Returns false when nobody is waiting.
    pub fn resolve(&self, id: u64, response: RpcResponse) -> bool {
        match self.pending.remove(&id) {
            Some((_, slot)) => {
                if slot.tx.send(response).is_err() {
                    debug!(id, "Waiter went away before its response arrived");
                }
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drop every slot. Waiters observe `WebSocketDisconnected`.
    pub fn fail_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Receiving half of a registered request. Dropping it cancels the slot.
pub struct Waiter {
    id: u64,
    token: u64,
    rx: oneshot::Receiver<RpcResponse>,
    pending: Arc<DashMap<u64, PendingSlot>>,
}

impl Waiter {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(mut self) -> Result<RpcResponse> {
        (&mut self.rx)
            .await
            .map_err(|_| TrackerError::WebSocketDisconnected)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let token = self.token;
        self.pending.remove_if(&self.id, |_, slot| slot.token == token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let table = CorrelationTable::new();
        let waiter = table.register(1).unwrap();
        assert!(table.contains(1));

        assert!(table.resolve(1, RpcResponse::success(1, json!(99))));
        let response = waiter.recv().await.unwrap();
        assert_eq!(response.into_result().unwrap(), json!(99));
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolve_unknown_id() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(5, RpcResponse::success(5, json!(true))));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let table = CorrelationTable::new();
        let _waiter = table.register(3).unwrap();
        assert!(matches!(
            table.register(3),
            Err(TrackerError::DuplicateRequestId(3))
        ));
    }

    #[test]
    fn test_dropping_waiter_cancels_slot() {
        let table = CorrelationTable::new();
        let waiter = table.register(4).unwrap();
        drop(waiter);
        assert!(!table.contains(4));
        assert!(!table.resolve(4, RpcResponse::success(4, json!(1))));
    }

    #[test]
    fn test_stale_waiter_does_not_remove_new_registration() {
        let table = CorrelationTable::new();
        let first = table.register(9).unwrap();
        assert!(table.cancel(9));
        let _second = table.register(9).unwrap();
        drop(first);
        assert!(table.contains(9));
    }

    #[tokio::test]
    async fn test_fail_all_wakes_waiters() {
        let table = CorrelationTable::new();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();
        assert_eq!(table.fail_all(), 2);
        assert!(matches!(a.recv().await, Err(TrackerError::WebSocketDisconnected)));
        assert!(matches!(b.recv().await, Err(TrackerError::WebSocketDisconnected)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_get_their_own_response() {
        let table = CorrelationTable::new();
        let mut handles = Vec::new();
        for id in 0..64u64 {
            let waiter = table.register(id).unwrap();
            handles.push(tokio::spawn(async move {
                let response = waiter.recv().await.unwrap();
                assert_eq!(response.id, id);
                assert_eq!(response.into_result().unwrap(), json!(id * 10));
            }));
        }

        for id in (0..64u64).rev() {
            let table = table.clone();
            tokio::spawn(async move {
                assert!(table.resolve(id, RpcResponse::success(id, json!(id * 10))));
            });
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(table.is_empty());
    }
}
