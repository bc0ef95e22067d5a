// src/subscribe/store.rs
//! Subscription persistence contract plus the two bundled implementations:
//! an in-memory store for tests and single-process setups, and a JSON file
//! store with atomic tmp-file + rename writes. Storage failures are fatal
//! for the attempted operation and always surfaced.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use super::Subscription;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("subscription storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions owned by this email, creation order.
    async fn get(&self, email: &str) -> Result<Vec<Subscription>, StoreError>;

    async fn find(&self, email: &str, id: &str) -> Result<Option<Subscription>, StoreError>;

    /// Insert, or replace the record with the same (email, id). The write is
    /// atomic with respect to concurrent readers of the same record.
    async fn put(&self, sub: Subscription) -> Result<(), StoreError>;

    /// Returns whether the record existed.
    async fn delete(&self, email: &str, id: &str) -> Result<bool, StoreError>;

    /// Subscriptions due at `now` (wall-clock minute match, not yet run
    /// today).
    async fn list_due(&self, now: DateTime<FixedOffset>) -> Result<Vec<Subscription>, StoreError>;
}

type SubsByEmail = HashMap<String, Vec<Subscription>>;

fn upsert(map: &mut SubsByEmail, sub: Subscription) {
    let entry = map.entry(sub.email.clone()).or_default();
    match entry.iter_mut().find(|s| s.id == sub.id) {
        Some(existing) => *existing = sub,
        None => entry.push(sub),
    }
}

fn remove(map: &mut SubsByEmail, email: &str, id: &str) -> bool {
    let Some(entry) = map.get_mut(email) else {
        return false;
    };
    let before = entry.len();
    entry.retain(|s| s.id != id);
    let removed = entry.len() < before;
    if entry.is_empty() {
        map.remove(email);
    }
    removed
}

fn due_in(map: &SubsByEmail, now: DateTime<FixedOffset>) -> Vec<Subscription> {
    let mut due: Vec<Subscription> = map
        .values()
        .flatten()
        .filter(|s| s.is_due(&now))
        .cloned()
        .collect();
    due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    due
}

// ------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<SubsByEmail>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, email: &str) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(map.get(email).cloned().unwrap_or_default())
    }

    async fn find(&self, email: &str, id: &str) -> Result<Option<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(map
            .get(email)
            .and_then(|subs| subs.iter().find(|s| s.id == id))
            .cloned())
    }

    async fn put(&self, sub: Subscription) -> Result<(), StoreError> {
        let mut map = self.inner.write().expect("subscription store lock poisoned");
        upsert(&mut map, sub);
        Ok(())
    }

    async fn delete(&self, email: &str, id: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.write().expect("subscription store lock poisoned");
        Ok(remove(&mut map, email, id))
    }

    async fn list_due(&self, now: DateTime<FixedOffset>) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(due_in(&map, now))
    }
}

// ------------------------------------------------------------
// JSON file store
// ------------------------------------------------------------

pub struct JsonFileStore {
    path: PathBuf,
    inner: RwLock<SubsByEmail>,
}

impl JsonFileStore {
    /// Load the store, creating parent directories as needed. A missing file
    /// is an empty store; a corrupt one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StoreError::Unavailable(format!("parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SubsByEmail::new(),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            inner: RwLock::new(map),
        })
    }

    fn persist(&self, map: &SubsByEmail) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Unavailable(format!("encode: {e}")))?;
        write_atomic(&self.path, json.as_bytes())
            .map_err(|e| StoreError::Unavailable(format!("write {}: {e}", self.path.display())))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    std::fs::rename(tmp, path)
}

#[async_trait::async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn get(&self, email: &str) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(map.get(email).cloned().unwrap_or_default())
    }

    async fn find(&self, email: &str, id: &str) -> Result<Option<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(map
            .get(email)
            .and_then(|subs| subs.iter().find(|s| s.id == id))
            .cloned())
    }

    async fn put(&self, sub: Subscription) -> Result<(), StoreError> {
        let mut map = self.inner.write().expect("subscription store lock poisoned");
        upsert(&mut map, sub);
        self.persist(&map)
    }

    async fn delete(&self, email: &str, id: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.write().expect("subscription store lock poisoned");
        let removed = remove(&mut map, email, id);
        if removed {
            self.persist(&map)?;
        }
        Ok(removed)
    }

    async fn list_due(&self, now: DateTime<FixedOffset>) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().expect("subscription store lock poisoned");
        Ok(due_in(&map, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use crate::subscribe::NotifyTime;
    use chrono::{TimeZone, Utc};

    fn sub(email: &str) -> Subscription {
        Subscription::new(
            email,
            Query::new(vec!["rust".into()], vec!["google".into()], "", None).unwrap(),
            NotifyTime::new(9, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn memory_store_crud_roundtrip() {
        let store = MemoryStore::new();
        let a = sub("user@example.com");
        let b = sub("user@example.com");
        store.put(a.clone()).await.unwrap();
        store.put(b.clone()).await.unwrap();

        assert_eq!(store.get("user@example.com").await.unwrap().len(), 2);
        assert_eq!(
            store.find("user@example.com", &a.id).await.unwrap().unwrap().id,
            a.id
        );

        assert!(store.delete("user@example.com", &a.id).await.unwrap());
        assert!(!store.delete("user@example.com", &a.id).await.unwrap());
        assert_eq!(store.get("user@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_with_same_id_replaces() {
        let store = MemoryStore::new();
        let mut a = sub("user@example.com");
        store.put(a.clone()).await.unwrap();
        a.last_run = Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        store.put(a.clone()).await.unwrap();

        let subs = store.get("user@example.com").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].last_run.is_some());
    }

    #[tokio::test]
    async fn list_due_applies_minute_and_day_guard() {
        let store = MemoryStore::new();
        let mut fired = sub("a@example.com");
        fired.last_run = Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        store.put(fired).await.unwrap();
        store.put(sub("b@example.com")).await.unwrap();

        let now = Utc
            .with_ymd_and_hms(2024, 6, 1, 9, 0, 30)
            .unwrap()
            .fixed_offset();
        let due = store.list_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].email, "b@example.com");
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");

        let a = sub("user@example.com");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put(a.clone()).await.unwrap();
        }
        let store = JsonFileStore::open(&path).unwrap();
        let subs = store.get("user@example.com").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, a.id);
    }

    #[test]
    fn corrupt_file_is_surfaced_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Unavailable(_))
        ));
    }
}
