//! Time-based cache for fetched themes.
//!
//! A fresh entry is served under the read lock only. The first reader to see
//! a stale entry takes the refresh lock, re-checks, reloads and swaps; readers
//! arriving meanwhile keep getting the stale value instead of blocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use crate::dom::Document;

struct Entry<T> {
    value: Arc<T>,
    expires_at: Instant,
}

pub struct CacheSlot<T> {
    entry: RwLock<Option<Entry<T>>>,
    refresh: Mutex<()>,
    ttl: Duration,
}

impl<T> CacheSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
            ttl,
        }
    }

    /// Returns `(value, fresh)` for the current entry, if any.
    fn peek(&self) -> Option<(Arc<T>, bool)> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|e| (Arc::clone(&e.value), Instant::now() < e.expires_at))
    }

    /// Get the cached value, running `load` when it is missing or stale.
    pub fn get_or_refresh<E, F>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let stale = match self.peek() {
            Some((value, true)) => return Ok(value),
            Some((value, false)) => Some(value),
            None => None,
        };

        let _guard = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => match stale {
                Some(value) => return Ok(value),
                None => self.refresh.lock().unwrap_or_else(PoisonError::into_inner),
            },
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        // Another thread may have refreshed while we waited.
        if let Some((value, true)) = self.peek() {
            return Ok(value);
        }

        let value = Arc::new(load()?);
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *entry = Some(Entry {
            value: Arc::clone(&value),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    pub fn invalidate(&self) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Parsed themes keyed by URL.
pub struct ThemeCache {
    slots: Mutex<HashMap<String, Arc<CacheSlot<Document>>>>,
    ttl: Duration,
}

impl ThemeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached theme for `url`, loading it on a miss or after expiry.
    pub fn get<E, F>(&self, url: &str, load: F) -> Result<Arc<Document>, E>
    where
        F: FnOnce() -> Result<Document, E>,
    {
        if self.ttl.is_zero() {
            return load().map(Arc::new);
        }
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                slots
                    .entry(url.to_string())
                    .or_insert_with(|| Arc::new(CacheSlot::new(self.ttl))),
            )
        };
        slot.get_or_refresh(load)
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ThemeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

    #[test]
    fn test_fresh_entry_is_reused() {
        let slot = CacheSlot::new(Duration::from_secs(60));
        let loads = Cell::new(0);
        for _ in 0..3 {
            let v = slot
                .get_or_refresh(|| {
                    loads.set(loads.get() + 1);
                    Ok::<_, ()>(42)
                })
                .unwrap();
            assert_eq!(*v, 42);
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn test_stale_entry_reloads() {
        let slot = CacheSlot::new(Duration::from_millis(1));
        slot.get_or_refresh(|| Ok::<_, ()>(1)).unwrap();
        thread::sleep(Duration::from_millis(5));
        let v = slot.get_or_refresh(|| Ok::<_, ()>(2)).unwrap();
        assert_eq!(*v, 2);
    }

    #[test]
    fn test_failed_load_keeps_nothing() {
        let slot: CacheSlot<i32> = CacheSlot::new(Duration::from_secs(60));
        assert_eq!(slot.get_or_refresh(|| Err("down")).unwrap_err(), "down");
        assert_eq!(*slot.get_or_refresh(|| Ok::<_, &str>(7)).unwrap(), 7);
    }

    #[test]
    fn test_concurrent_readers_load_once() {
        let slot = Arc::new(CacheSlot::new(Duration::from_secs(60)));
        let loads = Arc::new(Mutex::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    *slot
                        .get_or_refresh(|| {
                            *loads.lock().unwrap() += 1;
                            Ok::<_, ()>(5)
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 5);
        }
        assert_eq!(*loads.lock().unwrap(), 1);
    }

    #[test]
    fn test_theme_cache_zero_ttl_bypasses() {
        let cache = ThemeCache::new(Duration::ZERO);
        cache.get("http://x/t", || Ok::<_, ()>(Document::new())).unwrap();
        assert!(cache.is_empty());

        let cache = ThemeCache::new(Duration::from_secs(60));
        cache.get("http://x/t", || Ok::<_, ()>(Document::new())).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
