use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use garagekit_core::GarageId;
use std::sync::Arc;

/// Garage-isolated key/value store abstraction for disposable read models.
pub trait GarageStore<K, V>: Send + Sync {
    fn get(&self, garage_id: GarageId, key: &K) -> Option<V>;
    fn upsert(&self, garage_id: GarageId, key: K, value: V);
    fn list(&self, garage_id: GarageId) -> Vec<V>;
    /// Clear all read-model records for a garage (rebuild support).
    fn clear_garage(&self, garage_id: GarageId);
}

impl<K, V, S> GarageStore<K, V> for Arc<S>
where
    S: GarageStore<K, V> + ?Sized,
{
    fn get(&self, garage_id: GarageId, key: &K) -> Option<V> {
        (**self).get(garage_id, key)
    }

    fn upsert(&self, garage_id: GarageId, key: K, value: V) {
        (**self).upsert(garage_id, key, value)
    }

    fn list(&self, garage_id: GarageId) -> Vec<V> {
        (**self).list(garage_id)
    }

    fn clear_garage(&self, garage_id: GarageId) {
        (**self).clear_garage(garage_id)
    }
}

/// In-memory garage-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryGarageStore<K, V> {
    inner: RwLock<HashMap<(GarageId, K), V>>,
}

impl<K, V> InMemoryGarageStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryGarageStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> GarageStore<K, V> for InMemoryGarageStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, garage_id: GarageId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(garage_id, key.clone())).cloned()
    }

    fn upsert(&self, garage_id: GarageId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((garage_id, key), value);
        }
    }

    fn list(&self, garage_id: GarageId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((g, _k), v)| if *g == garage_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_garage(&self, garage_id: GarageId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(g, _k), _v| *g != garage_id);
        }
    }
}
