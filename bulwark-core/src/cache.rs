//! Content-addressed result cache
//!
//! Entries are keyed by `"{tool}:{sha256(canonical payload)}"`. Canonical form is JSON
//! with object keys sorted at every depth, so two payloads that differ only in field
//! order share a key. Expired entries are dropped lazily on lookup, and swept in bulk
//! whenever a write finds the map at its purge threshold.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Entry count at which `set` sweeps expired entries before inserting
pub const DEFAULT_PURGE_THRESHOLD: usize = 1024;

/// Upper bound used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// A cached tool result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized result value
    pub value: Value,
    /// Time of the execution that produced the value
    pub fetched_at: DateTime<Utc>,
    /// Monotonic expiry
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// In-memory TTL cache shared by concurrent executions
#[derive(Debug)]
pub struct ContentCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    purge_threshold: usize,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }
}

impl ContentCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache that sweeps expired entries once it holds `threshold` of them
    pub fn with_purge_threshold(threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            purge_threshold: threshold.max(1),
        }
    }

    /// Deterministic key for a tool call
    pub fn key<P: Serialize + ?Sized>(tool_name: &str, payload: &P) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(payload)?;
        Ok(format!("{}:{}", tool_name, content_digest(&value)))
    }

    /// Look up a live entry, evicting it if it has expired
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value; a zero TTL disables caching for the call
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration, fetched_at: DateTime<Utc>) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        let mut entries = self.entries.lock();
        if entries.len() >= self.purge_threshold {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            tracing::debug!(purged = before - entries.len(), "swept expired cache entries");
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                fetched_at,
                expires_at,
            },
        );
    }

    /// Remove one entry
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries (expired ones included until evicted)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Hex SHA-256 of the canonical JSON form of `value`
pub fn content_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compact JSON with object keys sorted recursively
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct CityFirst {
        city: &'static str,
        days: u32,
        prefs: Prefs,
    }

    #[derive(Serialize)]
    struct DaysFirst {
        prefs: Prefs,
        days: u32,
        city: &'static str,
    }

    #[derive(Serialize, Clone, Copy)]
    struct Prefs {
        kid_friendly: bool,
        max_walk_km: u32,
    }

    #[test]
    fn test_key_ignores_field_order() {
        let prefs = Prefs {
            kid_friendly: true,
            max_walk_km: 3,
        };
        let a = CityFirst {
            city: "Paris",
            days: 4,
            prefs,
        };
        let b = DaysFirst {
            prefs,
            days: 4,
            city: "Paris",
        };
        assert_eq!(
            ContentCache::key("weather", &a).unwrap(),
            ContentCache::key("weather", &b).unwrap()
        );
    }

    #[test]
    fn test_key_differs_by_value_and_tool() {
        let k1 = ContentCache::key("weather", &json!({"city": "Paris"})).unwrap();
        let k2 = ContentCache::key("weather", &json!({"city": "Lyon"})).unwrap();
        let k3 = ContentCache::key("fx", &json!({"city": "Paris"})).unwrap();
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("weather:"));
        assert_eq!(k1.len(), "weather:".len() + 64);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": [{"z": 1, "a": 2}], "a": "x"});
        assert_eq!(canonical_json(&value), r#"{"a":"x","b":[{"a":2,"z":1}]}"#);
    }

    #[test]
    fn test_get_returns_none_when_empty() {
        let cache = ContentCache::new();
        assert!(cache.get("weather:abc").is_none());
    }

    #[test]
    fn test_zero_ttl_is_noop() {
        let cache = ContentCache::new();
        cache.set("k", json!(1), Duration::ZERO, Utc::now());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_lives_until_ttl_then_evicted() {
        let cache = ContentCache::new();
        let fetched_at = Utc::now();
        cache.set("k", json!({"temp": 72}), Duration::from_secs(60), fetched_at);

        tokio::time::advance(Duration::from_secs(59)).await;
        let entry = cache.get("k").expect("entry still live");
        assert_eq!(entry.value, json!({"temp": 72}));
        assert_eq!(entry.fetched_at, fetched_at);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0, "expired entry removed on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ContentCache::new();
        cache.set("short", json!(1), Duration::from_secs(1), Utc::now());
        cache.set("long", json!(2), Duration::from_secs(100), Utc::now());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate("long"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_expired_entries_at_threshold() {
        let cache = ContentCache::with_purge_threshold(3);
        for i in 0..3 {
            cache.set(format!("weather:{i}"), json!(i), Duration::from_secs(1), Utc::now());
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.len(), 3, "nothing looked up, nothing evicted yet");

        cache.set("weather:fresh", json!("sunny"), Duration::from_secs(60), Utc::now());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("weather:fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_entries() {
        let cache = ContentCache::with_purge_threshold(2);
        cache.set("a", json!(1), Duration::from_secs(100), Utc::now());
        cache.set("b", json!(2), Duration::from_secs(100), Utc::now());
        cache.set("c", json!(3), Duration::from_secs(100), Utc::now());
        assert_eq!(cache.len(), 3);
    }
}
