//! Memory Store: in-process key-value store with TTL support.
//! Used for local runs and as the store behind the test-suite.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time;

use super::glob;
use super::{ScanPage, StoreClient, StoreResult};

// ========================================
// VALUE TYPES
// ========================================

/// Data types a key can hold. Only `String` is visible to value lookups.
#[derive(Clone, Debug)]
pub enum Value {
    String(Bytes),
    Hash(HashMap<String, Bytes>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }
}

// ========================================
// MEMORY STORE
// ========================================

/// Keys live in the `DashMap`; `index` keeps the same key set in order so a
/// scan page only walks the keys it returns.
///
/// Lock order: `index` first, then the map shard.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Entry>>,
    index: Arc<RwLock<BTreeSet<String>>>,
}

impl MemoryStore {
    /// Creates the store and spawns its expiry sweep. Must run inside a tokio runtime.
    ///
    /// `cleanup_interval` must be non-zero.
    pub fn new(cleanup_interval: Duration) -> Self {
        let inner = Arc::new(DashMap::new());
        let index = Arc::new(RwLock::new(BTreeSet::new()));

        // Weak references so the sweep does not keep a dropped store alive
        let weak_inner = Arc::downgrade(&inner);
        let weak_index = Arc::downgrade(&index);

        tokio::spawn(async move {
            let mut interval = time::interval(cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;

                let (Some(map), Some(index)) = (weak_inner.upgrade(), weak_index.upgrade()) else {
                    break;
                };
                let now = Instant::now();
                let mut index = index.write();
                let mut evicted = 0usize;
                map.retain(|key, entry: &mut Entry| {
                    if entry.is_expired(now) {
                        index.remove(key);
                        evicted += 1;
                        false
                    } else {
                        true
                    }
                });
                drop(index);
                if evicted > 0 {
                    tracing::debug!(evicted, "memory store sweep");
                }
            }
        });

        Self { inner, index }
    }

    // ========================================
    // WRITE OPERATIONS (seeding only)
    // ========================================

    /// Stores a string value without expiration, replacing any previous value and TTL.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.insert(key.into(), Value::String(value.into()), None);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Duration) {
        self.insert(key.into(), Value::String(value.into()), Some(Instant::now() + ttl));
    }

    /// Sets a hash field, turning the key into a hash if it held nothing.
    /// Returns false when the key holds a string.
    pub fn hset(&self, key: impl Into<String>, field: impl Into<String>, value: impl Into<Bytes>) -> bool {
        let now = Instant::now();
        let key = key.into();
        let mut index = self.index.write();
        let mut entry = self.inner.entry(key.clone()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry { value: Value::Hash(HashMap::new()), expires_at: None };
        }
        index.insert(key);
        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(field.into(), value.into());
                true
            }
            Value::String(_) => false,
        }
    }

    /// Attaches a TTL to an existing key. Returns false if the key is missing.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.update_expiry(key, Some(Instant::now() + ttl))
    }

    /// Removes the TTL of an existing key. Returns false if the key is missing.
    pub fn persist(&self, key: &str) -> bool {
        self.update_expiry(key, None)
    }

    /// Returns false if the key was missing.
    pub fn del(&self, key: &str) -> bool {
        let mut index = self.index.write();
        index.remove(key);
        self.inner.remove(key).is_some()
    }

    /// True when no key is stored, expired ones not yet swept included.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn insert(&self, key: String, value: Value, expires_at: Option<Instant>) {
        let mut index = self.index.write();
        self.inner.insert(key.clone(), Entry { value, expires_at });
        index.insert(key);
    }

    fn update_expiry(&self, key: &str, expires_at: Option<Instant>) -> bool {
        let now = Instant::now();
        match self.inner.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = expires_at;
                true
            }
            _ => false,
        }
    }

    /// Reads a live entry, evicting it on the way if it has expired.
    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.inner.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            let mut index = self.index.write();
            if self.inner.remove_if(key, |_, e| e.is_expired(now)).is_some() {
                index.remove(key);
            }
            return None;
        }
        Some(entry.value().clone())
    }

    fn is_live(&self, key: &str, now: Instant) -> bool {
        self.inner.get(key).is_some_and(|entry| !entry.is_expired(now))
    }
}

// ========================================
// STORE CLIENT
// ========================================

#[async_trait]
impl StoreClient for MemoryStore {
    async fn scan(&self, cursor: Option<&str>, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let now = Instant::now();
        let count = count.max(1);
        let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);

        let index = self.index.read();
        let mut after_cursor = index.range::<str, _>((lower, Bound::Unbounded));

        // Up to `count` live keys strictly after the cursor, in lexicographic order
        let mut window = Vec::with_capacity(count);
        let mut last_seen = None;
        for key in after_cursor.by_ref() {
            last_seen = Some(key);
            if self.is_live(key, now) {
                window.push(key.clone());
                if window.len() == count {
                    break;
                }
            }
        }
        let next = match after_cursor.next() {
            Some(_) => last_seen.cloned(),
            None => None,
        };
        drop(index);

        let keys = window
            .into_iter()
            .filter(|key| glob::matches(pattern, key))
            .collect();

        Ok(ScanPage { keys, cursor: next })
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live(key).and_then(|entry| match entry.value {
            Value::String(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Value::Hash(_) => None,
        }))
    }

    async fn time_to_live(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|expiry| expiry.saturating_duration_since(now)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
