// src/cache/memory.rs
//! # In-process cache
//! Short-TTL memoization guarding the normalization pipeline from running
//! on every request.
//!
//! One independent instance exists per logical dataset; there is no
//! cross-dataset invalidation and no mutual exclusion beyond the single
//! mutex. Concurrent misses may both invoke the producer — duplicate work,
//! not a correctness hazard, since entities are immutable.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Thread-safe single-value cache with a fixed TTL.
#[derive(Debug)]
pub struct MemoryCache<T> {
    inner: Mutex<Option<Entry<T>>>,
    ttl: Duration,
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

impl<T: Clone> MemoryCache<T> {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            ttl,
        }
    }

    /// Convenience constructor for the default 5-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(super::MEMORY_TTL)
    }

    /// Return the cached value while it is younger than the TTL.
    pub fn get(&self) -> Option<T> {
        let guard = self.inner.lock().expect("memory cache mutex poisoned");
        match guard.as_ref() {
            Some(e) if e.stored_at.elapsed() < self.ttl => Some(e.value.clone()),
            _ => None,
        }
    }

    /// Store a value and reset the clock.
    pub fn set(&self, value: T) {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        *guard = Some(Entry {
            value,
            stored_at: Instant::now(),
        });
    }

    /// Force the next `get()` to miss.
    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        *guard = None;
    }
}

impl<T: Clone> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_value_within_ttl() {
        let cache = MemoryCache::with_ttl(Duration::from_secs(60));
        assert_eq!(cache.get(), None);
        cache.set(vec![1, 2, 3]);
        assert_eq!(cache.get(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn get_misses_after_ttl() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(0));
        cache.set("x".to_string());
        // zero TTL: any elapsed time is past it
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn clear_forces_next_miss() {
        let cache = MemoryCache::with_ttl(Duration::from_secs(60));
        cache.set(7u32);
        cache.clear();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn set_resets_the_clock() {
        let cache = MemoryCache::with_ttl(Duration::from_secs(60));
        cache.set(1u8);
        cache.set(2u8);
        assert_eq!(cache.get(), Some(2));
    }
}
