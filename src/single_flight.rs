//! Single-flight cache
//!
//! A keyed cache where each key owns its own async `RwLock` slot. Readers
//! take the shared lock; a miss upgrades to the exclusive lock and re-checks
//! before running the initializer, so concurrent callers for one key
//! collapse into a single upstream call while other keys proceed in
//! parallel.
//!
//! A value is stored only after the initializer succeeds. A failed or
//! dropped (cancelled) initializer leaves the slot exactly as it was.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

type Slot<V> = Arc<RwLock<Option<V>>>;

#[derive(Debug)]
pub struct SingleFlightCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    fn existing_slot(&self, key: &K) -> Option<Slot<V>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    fn snapshot(&self) -> Vec<(K, Slot<V>)> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect()
    }

    /// Cached value for `key`, valid or not
    pub async fn get(&self, key: &K) -> Option<V> {
        let slot = self.existing_slot(key)?;
        let guard = slot.read().await;
        guard.clone()
    }

    /// Return the cached value if `is_valid` accepts it, otherwise run
    /// `init` under the key's exclusive lock and cache its result.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: K,
        is_valid: impl Fn(&V) -> bool,
        init: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&key);

        {
            let cached = slot.read().await;
            if let Some(value) = cached.as_ref().filter(|value| is_valid(value)) {
                return Ok(value.clone());
            }
        }

        let mut cached = slot.write().await;
        // Another caller may have filled the slot while we waited
        if let Some(value) = cached.as_ref().filter(|value| is_valid(value)) {
            return Ok(value.clone());
        }

        let value = init().await?;
        *cached = Some(value.clone());
        Ok(value)
    }

    /// Drop the value cached under `key`. Waits for an in-flight initializer.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let slot = self.existing_slot(key)?;
        let mut cached = slot.write().await;
        cached.take()
    }

    /// Remove the first entry matching `predicate`. Iteration order is unspecified.
    pub async fn remove_first_where(&self, predicate: impl Fn(&K, &V) -> bool) -> Option<(K, V)> {
        for (key, slot) in self.snapshot() {
            let mut cached = slot.write().await;
            if cached.as_ref().map_or(false, |value| predicate(&key, value)) {
                return cached.take().map(|value| (key, value));
            }
        }
        None
    }
}

impl<K, V> Default for SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_init_collapses() {
        let cache: Arc<SingleFlightCache<String, String>> = Arc::new(SingleFlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert_with(
                        "vbank".to_string(),
                        |_| true,
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>("token-1".to_string())
                        },
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_init_is_not_cached() {
        let cache: SingleFlightCache<&'static str, u32> = SingleFlightCache::new();

        let failed = cache
            .get_or_try_insert_with("k", |_| true, || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.get(&"k").await, None);

        let ok = cache
            .get_or_try_insert_with("k", |_| true, || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.get(&"k").await, Some(7));
    }

    #[tokio::test]
    async fn test_invalid_value_is_replaced() {
        let cache: SingleFlightCache<&'static str, u32> = SingleFlightCache::new();
        cache
            .get_or_try_insert_with("k", |_| true, || async { Ok::<_, ()>(1) })
            .await
            .unwrap();

        let refreshed = cache
            .get_or_try_insert_with("k", |v| *v > 1, || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert_eq!(refreshed, 2);
    }

    #[tokio::test]
    async fn test_cancelled_init_leaves_slot_untouched() {
        let cache: SingleFlightCache<&'static str, u32> = SingleFlightCache::new();

        let pending = cache.get_or_try_insert_with("k", |_| true, || async {
            std::future::pending::<Result<u32, ()>>().await
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn test_remove_first_where() {
        let cache: SingleFlightCache<(u8, &'static str), String> = SingleFlightCache::new();
        for (key, value) in [((1, "a"), "c-1"), ((2, "b"), "c-2")] {
            cache
                .get_or_try_insert_with(key, |_| true, || async move {
                    Ok::<_, ()>(value.to_string())
                })
                .await
                .unwrap();
        }

        let removed = cache.remove_first_where(|_, v| v == "c-2").await;
        assert_eq!(removed, Some(((2, "b"), "c-2".to_string())));
        assert_eq!(cache.get(&(2, "b")).await, None);
        assert_eq!(cache.get(&(1, "a")).await, Some("c-1".to_string()));

        assert!(cache.remove_first_where(|_, v| v == "missing").await.is_none());
    }
}
