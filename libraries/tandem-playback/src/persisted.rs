//! Bounded, time-stamped maps stored in the key/value store
//!
//! Each map lives under one key as a JSON object. Entries are parsed one by
//! one so a single corrupt entry is dropped without losing the rest.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tandem_core::KeyValueStore;
use tracing::{debug, warn};

/// Entry carrying its write time
pub(crate) trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Whether an entry written at `timestamp` is still within `horizon` of `now`
pub(crate) fn is_fresh(timestamp: DateTime<Utc>, now: DateTime<Utc>, horizon: Duration) -> bool {
    now - timestamp <= horizon
}

/// Drop the oldest entries until at most `capacity` remain.
///
/// Returns the number of entries removed.
pub(crate) fn evict_oldest<V: Timestamped>(entries: &mut HashMap<String, V>, capacity: usize) -> usize {
    if entries.len() <= capacity {
        return 0;
    }

    let mut by_age: Vec<(DateTime<Utc>, String)> = entries
        .iter()
        .map(|(name, entry)| (entry.timestamp(), name.clone()))
        .collect();
    by_age.sort();

    let excess = entries.len() - capacity;
    for (_, name) in by_age.into_iter().take(excess) {
        entries.remove(&name);
    }
    excess
}

/// In-memory front of a [`PersistedMap`], bounded and aged the same way
pub(crate) struct MemoryLayer<V> {
    entries: Mutex<HashMap<String, V>>,
    capacity: usize,
    horizon: Duration,
}

impl<V: Timestamped + Clone> MemoryLayer<V> {
    pub fn new(mut entries: HashMap<String, V>, capacity: usize, horizon: Duration) -> Self {
        evict_oldest(&mut entries, capacity);
        Self {
            entries: Mutex::new(entries),
            capacity,
            horizon,
        }
    }

    /// Entry for `name` if still fresh at `now`; a stale entry is dropped
    pub fn get(&self, name: &str, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(entry) if is_fresh(entry.timestamp(), now, self.horizon) => Some(entry.clone()),
            Some(_) => {
                entries.remove(name);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, name: String, entry: V) {
        let mut entries = self.entries.lock();
        entries.insert(name, entry);
        evict_oldest(&mut entries, self.capacity);
    }

    pub fn remove(&self, name: &str) {
        self.entries.lock().remove(name);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub(crate) struct PersistedMap<V> {
    key: &'static str,
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    _entry: PhantomData<fn() -> V>,
}

impl<V> PersistedMap<V>
where
    V: Serialize + DeserializeOwned + Timestamped,
{
    pub fn new(key: &'static str, store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            key,
            store,
            capacity,
            _entry: PhantomData,
        }
    }

    /// All readable entries, with corrupt ones dropped and logged
    fn read(&self) -> HashMap<String, V> {
        let raw = match self.store.get(self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                warn!(key = self.key, error = %e, "Failed to read persisted cache");
                return HashMap::new();
            }
        };

        let object: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(object) => object,
            Err(e) => {
                warn!(key = self.key, error = %e, "Dropping unreadable persisted cache");
                return HashMap::new();
            }
        };

        object
            .into_iter()
            .filter_map(|(name, value)| match serde_json::from_value::<V>(value) {
                Ok(entry) => Some((name, entry)),
                Err(e) => {
                    warn!(key = self.key, entry = %name, error = %e, "Dropping corrupt cache entry");
                    None
                }
            })
            .collect()
    }

    fn write(&self, entries: &HashMap<String, V>) {
        let result = serde_json::to_string(entries)
            .map_err(tandem_core::CoreError::from)
            .and_then(|json| self.store.set(self.key, &json));

        if let Err(e) = result {
            warn!(key = self.key, error = %e, "Failed to persist cache");
        }
    }

    /// Entries written within `horizon` of `now`
    pub fn load_fresh(&self, now: DateTime<Utc>, horizon: Duration) -> HashMap<String, V> {
        let mut entries = self.read();
        let total = entries.len();
        entries.retain(|_, entry| is_fresh(entry.timestamp(), now, horizon));
        debug!(
            key = self.key,
            loaded = entries.len(),
            expired = total - entries.len(),
            "Loaded persisted cache"
        );
        entries
    }

    /// One entry, if present and fresh
    pub fn get_fresh(&self, name: &str, now: DateTime<Utc>, horizon: Duration) -> Option<V> {
        self.read()
            .remove(name)
            .filter(|entry| is_fresh(entry.timestamp(), now, horizon))
    }

    /// Insert an entry, evicting the oldest ones above capacity
    pub fn insert(&self, name: &str, entry: V) {
        let mut entries = self.read();
        entries.insert(name.to_string(), entry);

        let evicted = evict_oldest(&mut entries, self.capacity);
        if evicted > 0 {
            debug!(key = self.key, evicted, "Evicted oldest cache entries");
        }

        self.write(&entries);
    }

    /// Remove one entry
    pub fn remove(&self, name: &str) {
        let mut entries = self.read();
        if entries.remove(name).is_some() {
            self.write(&entries);
        }
    }

    /// Number of readable entries, fresh or not
    pub fn len(&self) -> usize {
        self.read().len()
    }
}
