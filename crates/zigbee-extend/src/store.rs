//! Per-entity ephemeral store
//!
//! Holds transient timers and markers for stateful decoders and encoders
//! (alarm auto-clear, occupancy auto-clear, light freeze tracking), keyed by
//! device/endpoint or group identity. Nothing here is persisted; entries
//! disappear when a timer fires, when superseded, or on an explicit clear.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Identity of the entity a stateful converter acts on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Endpoint { ieee_address: String, endpoint: u8 },
    Group(u16),
}

impl EntityKey {
    #[must_use]
    pub fn endpoint(ieee_address: &str, endpoint: u8) -> Self {
        EntityKey::Endpoint {
            ieee_address: ieee_address.to_string(),
            endpoint,
        }
    }
}

type Slot = (EntityKey, String);

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Process-wide ephemeral state
#[derive(Debug, Default)]
pub struct EphemeralStore {
    /// Pending timers (keyed by entity and slot name)
    timers: DashMap<Slot, Timer>,
    values: DashMap<Slot, Value>,
    generation: AtomicU64,
}

impl EphemeralStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, replacing (and cancelling) any timer
    /// pending in the same slot. The slot is emptied before `on_fire` runs.
    pub fn schedule<F>(self: &Arc<Self>, key: &EntityKey, slot: &str, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let slot = (key.clone(), slot.to_string());
        let store = Arc::downgrade(self);

        // The entry guard is held across the spawn so the task cannot clear
        // its slot before the handle is stored.
        match self.timers.entry(slot.clone()) {
            Entry::Occupied(mut occupied) => {
                let handle = spawn_timer(store, slot, generation, delay, on_fire);
                let previous = occupied.insert(Timer { generation, handle });
                previous.handle.abort();
                tracing::debug!("Restarted timer {:?}", occupied.key());
            }
            Entry::Vacant(vacant) => {
                let handle = spawn_timer(store, slot, generation, delay, on_fire);
                vacant.insert(Timer { generation, handle });
            }
        }
    }

    /// Cancel a pending timer, returns whether one was pending
    pub fn cancel_timer(&self, key: &EntityKey, slot: &str) -> bool {
        match self.timers.remove(&(key.clone(), slot.to_string())) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn has_timer(&self, key: &EntityKey, slot: &str) -> bool {
        self.timers.contains_key(&(key.clone(), slot.to_string()))
    }

    pub fn put_value(&self, key: &EntityKey, slot: &str, value: Value) {
        self.values.insert((key.clone(), slot.to_string()), value);
    }

    #[must_use]
    pub fn get_value(&self, key: &EntityKey, slot: &str) -> Option<Value> {
        self.values
            .get(&(key.clone(), slot.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn take_value(&self, key: &EntityKey, slot: &str) -> Option<Value> {
        self.values
            .remove(&(key.clone(), slot.to_string()))
            .map(|(_, value)| value)
    }

    /// Drop every timer and value held for one entity
    pub fn clear_entity(&self, key: &EntityKey) {
        self.timers.retain(|(entity, _), timer| {
            if entity == key {
                timer.handle.abort();
                false
            } else {
                true
            }
        });
        self.values.retain(|(entity, _), _| entity != key);
    }

    /// Drop everything
    pub fn clear(&self) {
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
        self.timers.clear();
        self.values.clear();
    }
}

fn spawn_timer<F>(
    store: std::sync::Weak<EphemeralStore>,
    slot: Slot,
    generation: u64,
    delay: Duration,
    on_fire: F,
) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(store) = store.upgrade() else {
            return;
        };
        // A superseded or cancelled timer no longer owns its slot
        if store
            .timers
            .remove_if(&slot, |_, timer| timer.generation == generation)
            .is_none()
        {
            tracing::trace!("Dropping stale timer {:?} (generation {})", slot, generation);
            return;
        }
        drop(store);
        on_fire();
    })
}

impl Drop for EphemeralStore {
    fn drop(&mut self) {
        // Abort all timer tasks
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key() -> EntityKey {
        EntityKey::endpoint("00:11:22:33:44:55:66:77", 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_and_clears_slot() {
        let store = Arc::new(EphemeralStore::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        store.schedule(&key(), "alarm", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(store.has_timer(&key(), "alarm"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!store.has_timer(&key(), "alarm"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes() {
        let store = Arc::new(EphemeralStore::new());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = fired.clone();
            store.schedule(&key(), "alarm", Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_fire() {
        let store = Arc::new(EphemeralStore::new());
        let newest = Arc::new(AtomicUsize::new(0));
        let stale = Arc::new(AtomicUsize::new(0));

        let counter = newest.clone();
        store.schedule(&key(), "alarm", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // A task that lost its slot to the schedule above but was not aborted in time
        let counter = stale.clone();
        let _stale = spawn_timer(
            Arc::downgrade(&store),
            (key(), "alarm".to_string()),
            u64::MAX,
            Duration::from_millis(100),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert!(store.has_timer(&key(), "alarm"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(newest.load(Ordering::SeqCst), 1);
        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert!(!store.has_timer(&key(), "alarm"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_outliving_store_does_not_fire() {
        let store = Arc::new(EphemeralStore::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let _orphan = spawn_timer(
            Arc::downgrade(&store),
            (key(), "occupancy".to_string()),
            0,
            Duration::from_secs(1),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        drop(store);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_clear() {
        let store = Arc::new(EphemeralStore::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        store.schedule(&key(), "occupancy", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(store.cancel_timer(&key(), "occupancy"));
        assert!(!store.cancel_timer(&key(), "occupancy"));

        store.put_value(&key(), "brightness", Value::from(200));
        store.put_value(&EntityKey::Group(3), "brightness", Value::from(10));
        store.clear_entity(&key());
        assert_eq!(store.get_value(&key(), "brightness"), None);
        assert_eq!(
            store.get_value(&EntityKey::Group(3), "brightness"),
            Some(Value::from(10))
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
