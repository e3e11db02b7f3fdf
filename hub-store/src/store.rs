use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use hub_proto::VariableSchema;

use crate::error::StoreError;
use crate::flush::FlushRequester;

/// Anything that can receive a `WATCH` push. Implemented by `hub_server::Client` so the store
/// never has to know about sockets, send locks, or connection state.
pub trait NotifySink: Send + Sync {
    fn client_id(&self) -> u64;
    fn notify(&self, name: &str, value: f64);
}

struct Slot {
    persistent: bool,
    read_only: bool,
    value: Mutex<f64>,
    subscribers: Mutex<HashMap<u64, Arc<dyn NotifySink>>>,
}

/// The hub's variable table.
///
/// The set of names is fixed at construction time from a [`VariableSchema`]; nothing is ever
/// added or removed afterward. Every other operation is internally synchronized so the store can
/// be shared behind a plain `Arc` with no external locking.
pub struct VariableStore {
    slots: RwLock<HashMap<String, Slot>>,
    flush: Option<FlushRequester>,
}

impl VariableStore {
    pub fn new(schema: &VariableSchema) -> Self {
        let mut slots = HashMap::new();
        for v in &schema.entries {
            slots.insert(
                v.name.clone(),
                Slot {
                    persistent: v.persistent,
                    read_only: v.read_only,
                    value: Mutex::new(v.default),
                    subscribers: Mutex::new(HashMap::new()),
                },
            );
        }
        VariableStore {
            slots: RwLock::new(slots),
            flush: None,
        }
    }

    pub fn with_flusher(mut self, flush: FlushRequester) -> Self {
        self.flush = Some(flush);
        self
    }

    pub fn has_persistent_variables(&self) -> bool {
        self.slots.read().unwrap().values().any(|s| s.persistent)
    }

    /// Seed variable values from a parsed persistent-value file. Called once at startup, before
    /// any client connects.
    pub fn seed(&self, name: &str, value: f64) -> Result<(), StoreError> {
        let slots = self.slots.read().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| StoreError::UnknownPersistedVariable(name.to_owned()))?;
        if !slot.persistent {
            warn!("ignoring persisted value for non-persistent variable `{}`", name);
            return Ok(());
        }
        *slot.value.lock().unwrap() = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<(f64, bool), StoreError> {
        let slots = self.slots.read().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
        Ok((*slot.value.lock().unwrap(), slot.read_only))
    }

    /// Write a new value, then fan out `WATCH` pushes to the subscribers observed at the moment
    /// of the write. The write lock on the value is released before any notification is sent.
    pub fn set(&self, name: &str, value: f64) -> Result<(), StoreError> {
        let slots = self.slots.read().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
        if slot.read_only {
            return Err(StoreError::ReadOnly(name.to_owned()));
        }

        *slot.value.lock().unwrap() = value;

        if slot.persistent {
            if let Some(flush) = &self.flush {
                flush.request();
            }
        }

        let subscribers: Vec<Arc<dyn NotifySink>> =
            slot.subscribers.lock().unwrap().values().cloned().collect();
        drop(slots);

        for sub in subscribers {
            sub.notify(name, value);
        }

        Ok(())
    }

    pub fn subscribe(&self, client: Arc<dyn NotifySink>, name: &str) -> Result<(), StoreError> {
        let slots = self.slots.read().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
        slot.subscribers
            .lock()
            .unwrap()
            .insert(client.client_id(), client);
        Ok(())
    }

    pub fn unsubscribe(&self, client_id: u64, name: &str) -> Result<(), StoreError> {
        let slots = self.slots.read().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
        let mut subs = slot.subscribers.lock().unwrap();
        if subs.remove(&client_id).is_none() {
            return Err(StoreError::NotSubscribed(name.to_owned()));
        }
        Ok(())
    }

    /// Remove a client from every variable's subscriber set. Called exactly once, when the
    /// client is reaped.
    pub fn drop_client(&self, client_id: u64) {
        let slots = self.slots.read().unwrap();
        for slot in slots.values() {
            slot.subscribers.lock().unwrap().remove(&client_id);
        }
    }

    /// Snapshot of every persistent variable's current value, for the flusher to serialize.
    pub fn persistent_snapshot(&self) -> Vec<(String, f64)> {
        let slots = self.slots.read().unwrap();
        slots
            .iter()
            .filter(|(_, slot)| slot.persistent)
            .map(|(name, slot)| (name.clone(), *slot.value.lock().unwrap()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_proto::Variable;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Recorder {
        id: u64,
        seen: Mutex<Vec<(String, f64)>>,
    }

    impl NotifySink for Recorder {
        fn client_id(&self) -> u64 {
            self.id
        }
        fn notify(&self, name: &str, value: f64) {
            self.seen.lock().unwrap().push((name.to_owned(), value));
        }
    }

    fn schema() -> VariableSchema {
        VariableSchema {
            entries: vec![
                Variable::new("speed", 0.0, false, false),
                Variable::new("max_speed", 10.0, true, true),
            ],
        }
    }

    fn next_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    #[test]
    fn get_returns_the_default_value() {
        let store = VariableStore::new(&schema());
        let (value, read_only) = store.get("speed").unwrap();
        assert_eq!(value, 0.0);
        assert!(!read_only);
    }

    #[test]
    fn set_rejects_unknown_variables() {
        let store = VariableStore::new(&schema());
        assert!(matches!(store.set("nope", 1.0), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn set_rejects_read_only_variables() {
        let store = VariableStore::new(&schema());
        assert!(matches!(
            store.set("max_speed", 1.0),
            Err(StoreError::ReadOnly(_))
        ));
    }

    #[test]
    fn subscribers_observed_at_write_time_are_notified_exactly_once() {
        let store = VariableStore::new(&schema());
        let sub = Arc::new(Recorder {
            id: next_id(),
            seen: Mutex::new(Vec::new()),
        });
        store.subscribe(sub.clone(), "speed").unwrap();

        store.set("speed", 2.0).unwrap();

        assert_eq!(sub.seen.lock().unwrap().as_slice(), &[("speed".to_owned(), 2.0)]);
    }

    #[test]
    fn unsubscribe_stops_further_notifications() {
        let store = VariableStore::new(&schema());
        let sub = Arc::new(Recorder {
            id: next_id(),
            seen: Mutex::new(Vec::new()),
        });
        let id = sub.id;
        store.subscribe(sub.clone(), "speed").unwrap();
        store.unsubscribe(id, "speed").unwrap();

        store.set("speed", 3.0).unwrap();

        assert!(sub.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn drop_client_clears_every_subscription() {
        let store = VariableStore::new(&schema());
        let sub = Arc::new(Recorder {
            id: next_id(),
            seen: Mutex::new(Vec::new()),
        });
        let id = sub.id;
        store.subscribe(sub.clone(), "speed").unwrap();

        store.drop_client(id);
        store.set("speed", 4.0).unwrap();

        assert!(sub.seen.lock().unwrap().is_empty());
    }
}
