use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

struct Slot<T> {
    id: u64,
    tx: mpsc::Sender<T>,
}

/// Outcome of delivering one item to every listener
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Listeners whose buffer was full
    pub dropped: usize,
    /// Listeners found closed and pruned
    pub closed: usize,
}

/// Bounded listener channels that each receive every broadcast item.
///
/// Delivery never blocks: a full buffer loses the item for that listener only.
pub struct FanoutRegistry<T> {
    slots: Mutex<Vec<Slot<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone> FanoutRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, capacity: usize) -> Listener<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push(Slot { id, tx });
        Listener { id, rx }
    }

    /// Remove a listener. Its receiver drains what is buffered, then ends.
    pub fn remove(&self, id: u64) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        slots.len() != before
    }

    pub fn broadcast(&self, item: &T) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.slots.lock().retain(|slot| match slot.tx.try_send(item.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(listener = slot.id, "Listener buffer full, dropping message");
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.closed += 1;
                false
            }
        });
        report
    }

    /// Close every listener
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl<T: Clone> Default for FanoutRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a registered listener
pub struct Listener<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
}

impl<T> Listener<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next item, or `None` once the listener has been removed and drained
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}
