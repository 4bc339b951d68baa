//! The process-wide TTL cache external operators read and write through,
//! keyed by `"<target>@<variant>:<path>"`. Reads evict lazily on expiry; a
//! periodic sweeper (driven by the engine, not by this module) can also
//! call [`TtlCache::sweep`] to drop expired entries proactively.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::tree::Value;

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// A concurrent-safe TTL cache. Reads take a shared lock; writes and the
/// sweep take an exclusive lock.
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value if present and unexpired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: String, value: Value) {
        let mut entries = self.entries.write();
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Gets `key`, or calls `fetch` on miss/expiry and caches its result.
    pub fn get_or_fetch<E>(
        &self,
        key: &str,
        fetch: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch()?;
        self.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Drops every expired entry. Intended to be called periodically by a
    /// background sweeper (default interval: once a minute, per spec).
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn caches_and_returns_hits() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("default@vault:secret/db".to_string(), Value::Str("hunter2".to_string()));
        assert_eq!(cache.get("default@vault:secret/db"), Some(Value::Str("hunter2".to_string())));
    }

    #[test]
    fn get_or_fetch_only_calls_fetch_once() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = std::cell::Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(Value::Int(1))
        };
        cache.get_or_fetch("k", fetch).unwrap();
        cache.get_or_fetch("k", fetch).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn expired_entries_are_invisible_and_swept() {
        let cache = TtlCache::new(Duration::from_millis(1));
        cache.insert("k".to_string(), Value::Bool(true));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        cache.sweep();
        assert!(cache.is_empty());
    }
}
