//! Memoization of read-only dashboard queries.
//!
//! A `QueryCache` maps a `CacheKey` to a shared result with a time-to-live and
//! a size bound. When full, the entry with the oldest insertion time is
//! evicted. All bookkeeping happens under one mutex; the wrapped computation
//! runs outside it, so two callers missing on the same key at once may both
//! compute, and the later insert wins.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

/// Cache key: function name, then scalar arguments, then the file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(function: &str) -> Self {
        CacheKey(function.to_string())
    }

    /// Append a scalar argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.0.push(':');
        self.0.push_str(&value.to_string());
        self
    }

    /// Append the resolved source path, if there is one.
    pub fn path(mut self, path: Option<&Path>) -> Self {
        if let Some(p) = path {
            self.0.push(':');
            self.0.push_str(&p.to_string_lossy());
        }
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub ttl_secs: f64,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_ratio: f64,
    pub keys: Vec<String>,
}

struct CacheEntry<V> {
    inserted_at: Instant,
    value: Arc<V>,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

impl<V> CacheState<V> {
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(key = %key, "evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }
}

/// TTL cache for the results of one query function.
pub struct QueryCache<V> {
    name: &'static str,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState<V>>,
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

impl<V> QueryCache<V> {
    /// A cache that keeps at most `max_entries` results for `ttl` each.
    /// `max_entries == 0` disables storage; every call then recomputes.
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        QueryCache {
            name,
            ttl,
            max_entries,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the cached value for `key`, or compute, store and return it.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        {
            let mut state = self.state.lock();
            let fresh = match state.entries.get(&key) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(Arc::clone(&entry.value)),
                Some(_) => {
                    trace!(cache = self.name, key = %key, "cache entry expired");
                    state.entries.remove(&key);
                    None
                }
                None => None,
            };
            if let Some(value) = fresh {
                state.hits += 1;
                trace!(cache = self.name, key = %key, "cache hit");
                return value;
            }
            state.misses += 1;
        }

        debug!(cache = self.name, key = %key, "cache miss, computing");
        let value = Arc::new(compute());
        if self.max_entries == 0 {
            return value;
        }

        let mut state = self.state.lock();
        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.max_entries {
                state.evict_oldest();
            }
        }
        state.entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        value
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        let mut keys: Vec<String> = state.entries.keys().map(|k| k.to_string()).collect();
        keys.sort();
        CacheStats {
            size: state.entries.len(),
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs_f64(),
            hits: state.hits,
            misses: state.misses,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
            keys,
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        debug!(cache = self.name, "cache cleared");
    }
}
