//! Abstract cache provider interface (Redis, in-memory, etc.)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::StorageResult;

#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Set-if-not-exists semantics are expected of callers doing
    /// initialization races (§5 shared-resource policy); this trait
    /// exposes plain `set` and leaves the race-free variant to the
    /// adapter-specific `set_if_absent` below.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> StorageResult<bool>;

    async fn set_if_absent(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> StorageResult<bool>;

    async fn delete(&self, key: &str) -> StorageResult<bool>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Clears keys matching `prefix`, or everything when `None`.
    async fn clear(&self, prefix: Option<&str>) -> StorageResult<usize>;
}

struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

/// Process-local cache. Adequate for single-process deployments and tests;
/// a Redis-backed adapter implements the same trait for multi-process use.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.is_none_or(|at| at > Instant::now())
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let mut guard = self.entries.lock().unwrap();
        if let Some(entry) = guard.get(key) {
            if Self::is_live(entry) {
                return Ok(Some(entry.value.clone()));
            }
            guard.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> StorageResult<bool> {
        let mut guard = self.entries.lock().unwrap();
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }

    async fn set_if_absent(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> StorageResult<bool> {
        let mut guard = self.entries.lock().unwrap();
        let occupied = guard.get(key).map(Self::is_live).unwrap_or(false);
        if occupied {
            return Ok(false);
        }
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let guard = self.entries.lock().unwrap();
        Ok(guard.get(key).map(Self::is_live).unwrap_or(false))
    }

    async fn clear(&self, prefix: Option<&str>) -> StorageResult<usize> {
        let mut guard = self.entries.lock().unwrap();
        match prefix {
            None => {
                let n = guard.len();
                guard.clear();
                Ok(n)
            }
            Some(p) => {
                let before = guard.len();
                guard.retain(|k, _| !k.starts_with(p));
                Ok(before - guard.len())
            }
        }
    }
}
