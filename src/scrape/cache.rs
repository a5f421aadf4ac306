use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
}

/// Process-wide memo of successful resolutions, one slot per key.
///
/// Concurrent callers for the same key share a single in-flight producer.
/// A failed producer leaves nothing behind: the empty slot is dropped from the
/// map, so the next caller (or the next waiter of the same flight) runs its own
/// producer. Successful entries are never evicted.
pub struct FetchCache<V> {
    name: &'static str,
    slots: Mutex<HashMap<String, Arc<OnceCell<CacheEntry<V>>>>>,
}

impl<V: Clone> FetchCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Arc<OnceCell<CacheEntry<V>>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn resolve<F, Fut, E>(&self, key: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);

        if let Some(entry) = slot.get() {
            log::debug!(
                "({}) cache hit for '{key}', cached at {}",
                self.name,
                entry.created_at.to_rfc3339()
            );
            return Ok(entry.value.clone());
        }

        let result = slot
            .get_or_try_init(|| async {
                log::debug!("({}) cache miss for '{key}', fetching", self.name);
                let value = producer().await?;
                log::debug!("({}) data cached for '{key}'", self.name);
                Ok::<_, E>(CacheEntry {
                    value,
                    created_at: Utc::now(),
                })
            })
            .await;

        match result {
            Ok(entry) => {
                let value = entry.value.clone();
                self.keep(key, &slot);
                Ok(value)
            }
            Err(err) => {
                self.release(key, &slot);
                Err(err)
            }
        }
    }

    /// Re-attaches a filled slot that a failed waiter released meanwhile.
    fn keep(&self, key: &str, slot: &Arc<OnceCell<CacheEntry<V>>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_insert_with(|| slot.clone());
    }

    fn release(&self, key: &str, slot: &Arc<OnceCell<CacheEntry<V>>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_producer_runs_once_per_key() {
        let cache = FetchCache::<String>::new("test");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .resolve("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("v".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "v");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k").is_some());
    }

    #[tokio::test]
    async fn test_failure_is_not_stored() {
        let cache = FetchCache::<u32>::new("test");
        let calls = AtomicUsize::new(0);

        let first = cache
            .resolve("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>("boom")
            })
            .await;
        assert_eq!(first, Err("boom"));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);

        let second = cache
            .resolve("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(7)
            })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_keys_leave_no_slot() {
        let cache = FetchCache::<u32>::new("test");

        for i in 0..100 {
            let result = cache
                .resolve(&format!("k{i}"), || async { Err::<u32, _>("unreachable") })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.slot_count(), 0);

        cache.resolve("ok", || async { Ok::<_, &str>(1) }).await.unwrap();
        assert_eq!(cache.slot_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_leave_no_slot() {
        let cache = Arc::new(FetchCache::<String>::new("test"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .resolve("down", || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err::<String, _>("refused".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }

        assert_eq!(cache.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = FetchCache::<&'static str>::new("test");

        let a = cache.resolve("a", || async { Ok::<_, ()>("A") }).await;
        let b = cache.resolve("b", || async { Ok::<_, ()>("B") }).await;

        assert_eq!(a, Ok("A"));
        assert_eq!(b, Ok("B"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_flight() {
        let cache = Arc::new(FetchCache::<String>::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .resolve("shared", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>("body".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "body");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_created_at_is_set() {
        let cache = FetchCache::<u8>::new("test");
        let before = Utc::now();
        cache.resolve("k", || async { Ok::<_, ()>(1) }).await.unwrap();

        let entry = cache.get("k").unwrap();
        assert!(entry.created_at >= before);
    }
}
