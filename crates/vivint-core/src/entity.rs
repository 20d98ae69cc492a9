// ── Observable entity core ──
//
// Every node in the device graph holds two representations of itself: a
// raw attribute map (the authoritative wire form, which survives unknown
// keys) and a typed view decoded from it. The typed view is refreshed on
// every raw mutation; when revalidation fails the stale view is kept and
// a warning is logged, so unknown future payloads degrade instead of
// crashing.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Event emitted on every raw-data mutation.
pub const UPDATE: &str = "update";

type ListenerFn = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, ListenerFn)>>,
}

/// Handle returned by [`Entity::on`]; dropping it does nothing, calling
/// [`unsubscribe`](Subscription::unsubscribe) removes the listener.
pub struct Subscription {
    event: String,
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock().expect("listener table lock poisoned");
            if let Some(listeners) = table.listeners.get_mut(&self.event) {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// An observable entity: raw payload + typed projection + events.
pub struct Entity<T> {
    raw: Map<String, Value>,
    model: Option<T>,
    listeners: Arc<Mutex<ListenerTable>>,
}

impl<T> Entity<T> {
    /// The raw attribute map (authoritative).
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// The typed view, if the raw map currently validates.
    pub fn model(&self) -> Option<&T> {
        self.model.as_ref()
    }

    /// Shorthand raw-key lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Register a listener. Listeners run in registration order; every
    /// `update` emitted between registration and unsubscribe is seen.
    pub fn on(&self, event: &str, listener: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        let mut table = self.listeners.lock().expect("listener table lock poisoned");
        let id = table.next_id;
        table.next_id += 1;
        table
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            event: event.to_owned(),
            id,
            table: Arc::downgrade(&self.listeners),
        }
    }

    /// Synchronously dispatch an event. A panicking listener is caught
    /// and logged so it cannot starve the ones after it.
    pub fn emit(&self, event: &str, payload: Value) {
        let listeners: Vec<ListenerFn> = {
            let table = self.listeners.lock().expect("listener table lock poisoned");
            table
                .listeners
                .get(event)
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&payload))).is_err() {
                warn!(event, "entity listener panicked");
            }
        }
    }
}

impl<T: DeserializeOwned> Entity<T> {
    /// Build an entity from a raw payload, attempting the typed decode.
    pub fn new(raw: Map<String, Value>) -> Self {
        let mut entity = Self {
            raw,
            model: None,
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
        };
        entity.revalidate();
        entity
    }

    /// Apply a delta to the raw map, revalidate the typed view, and emit
    /// `update` carrying the delta. `override_raw` replaces the whole
    /// map instead of shallow-merging.
    pub fn update_data(&mut self, delta: Map<String, Value>, override_raw: bool) {
        if override_raw {
            self.raw = delta.clone();
        } else {
            for (key, value) in delta.clone() {
                self.raw.insert(key, value);
            }
        }
        self.revalidate();
        self.emit(UPDATE, json!({ "data": Value::Object(delta) }));
    }

    /// Default push handling: a partial merge.
    pub fn handle_message(&mut self, message: Map<String, Value>) {
        self.update_data(message, false);
    }

    /// Mutate the raw map directly, then revalidate. Used where a merge
    /// is not expressive enough (extending device lists in place).
    pub fn mutate_raw(&mut self, f: impl FnOnce(&mut Map<String, Value>)) {
        f(&mut self.raw);
        self.revalidate();
    }

    fn revalidate(&mut self) {
        match serde_json::from_value::<T>(Value::Object(self.raw.clone())) {
            Ok(model) => self.model = Some(model),
            Err(err) => {
                // Keep the stale view; raw remains authoritative.
                warn!(error = %err, "typed view no longer validates, keeping stale model");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(rename = "_id")]
        id: i64,
        #[serde(rename = "n", default)]
        name: Option<String>,
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn merge_applies_delta_keys_over_existing_raw() {
        let mut entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1, "n": "a", "x": 1 })));
        entity.update_data(raw(json!({ "n": "b", "y": 2 })), false);

        assert_eq!(entity.get("n"), Some(&json!("b")));
        assert_eq!(entity.get("x"), Some(&json!(1)));
        assert_eq!(entity.get("y"), Some(&json!(2)));
        assert_eq!(entity.model().unwrap().name.as_deref(), Some("b"));
    }

    #[test]
    fn override_replaces_the_whole_raw_map() {
        let mut entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1, "x": 1 })));
        entity.update_data(raw(json!({ "_id": 2 })), true);

        assert_eq!(entity.get("x"), None);
        assert_eq!(entity.model().unwrap().id, 2);
    }

    #[test]
    fn failed_revalidation_keeps_stale_model() {
        let mut entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1, "n": "a" })));
        // `_id` becomes a string, which Probe rejects.
        entity.update_data(raw(json!({ "_id": "oops" })), false);

        assert_eq!(entity.get("_id"), Some(&json!("oops")));
        let model = entity.model().unwrap();
        assert_eq!(model.id, 1);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1 })));
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let _s1 = entity.on("ping", move |_| o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        let _s2 = entity.on("ping", move |_| o2.lock().unwrap().push(2));

        entity.emit("ping", json!({}));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_before_emit_delivers_nothing() {
        let entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1 })));
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let sub = entity.on("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();

        entity.emit("ping", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_starve_the_next_one() {
        let entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1 })));
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = entity.on("ping", |_| panic!("listener bug"));
        let counter = Arc::clone(&hits);
        let _good = entity.on("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        entity.emit("ping", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_event_carries_the_applied_delta() {
        let mut entity: Entity<Probe> = Entity::new(raw(json!({ "_id": 1 })));
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let _sub = entity.on(UPDATE, move |payload| {
            *sink.lock().unwrap() = Some(payload.clone());
        });

        entity.update_data(raw(json!({ "n": "fresh" })), false);
        let payload = seen.lock().unwrap().clone().unwrap();
        assert_eq!(payload["data"]["n"], "fresh");
    }
}
