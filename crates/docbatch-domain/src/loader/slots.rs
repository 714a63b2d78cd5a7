//! Per-key broadcast slots shared by every caller waiting on the same fetch.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::broadcast;

/// Result delivered to the callers of one key.
pub(crate) type Outcome<V, E> = Result<V, E>;

/// Broadcast slot for one key of one batch group.
struct Slot<V, E> {
    sender: broadcast::Sender<Outcome<V, E>>,
    batch_id: u64,
}

/// Map of keys that are registered in a batch group but not yet settled.
///
/// A key has at most one slot. Callers that find a slot subscribe to it
/// instead of registering the key again, which is what keeps one fetch per
/// key in flight.
pub(crate) struct SlotMap<K, V, E> {
    slots: HashMap<K, Slot<V, E>>,
}

impl<K, V, E> SlotMap<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Subscribes to the slot for `key`, returning the owning batch id.
    pub fn join(&self, key: &K) -> Option<(u64, broadcast::Receiver<Outcome<V, E>>)> {
        self.slots
            .get(key)
            .map(|slot| (slot.batch_id, slot.sender.subscribe()))
    }

    /// Registers a fresh slot for `key` in batch `batch_id`.
    ///
    /// Returns the sender (kept by the batch for distribution) and the
    /// registering caller's receiver.
    pub fn register(
        &mut self,
        key: K,
        batch_id: u64,
    ) -> (
        broadcast::Sender<Outcome<V, E>>,
        broadcast::Receiver<Outcome<V, E>>,
    ) {
        // One value is ever sent per slot.
        let (sender, receiver) = broadcast::channel(1);
        self.slots.insert(
            key,
            Slot {
                sender: sender.clone(),
                batch_id,
            },
        );
        (sender, receiver)
    }

    /// Removes the slot for `key` if it still belongs to `sender`'s channel.
    ///
    /// Returns false when the slot was detached (cleared or re-primed) while
    /// the fetch was outstanding, in which case the result must not be cached.
    pub fn release(&mut self, key: &K, sender: &broadcast::Sender<Outcome<V, E>>) -> bool {
        match self.slots.get(key) {
            Some(slot) if slot.sender.same_channel(sender) => {
                self.slots.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Detaches the slot for `key` so its fetch no longer writes back.
    pub fn detach(&mut self, key: &K) {
        self.slots.remove(key);
    }

    /// Detaches the slot for `key` unless it belongs to the still-open batch.
    ///
    /// Keys in the open batch have not been fetched yet, so their eventual
    /// result already reflects whatever prompted the detach.
    pub fn detach_dispatched(&mut self, key: &K, open_batch: Option<u64>) {
        if let Some(slot) = self.slots.get(key) {
            if Some(slot.batch_id) != open_batch {
                self.slots.remove(key);
            }
        }
    }

    /// Detaches every slot outside the open batch.
    pub fn detach_all_dispatched(&mut self, open_batch: Option<u64>) {
        self.slots.retain(|_, slot| Some(slot.batch_id) == open_batch);
    }

    /// Number of keys currently pending or in flight.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
