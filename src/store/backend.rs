//! Key-value backends for persisted reader state.
//!
//! Every slot holds one JSON document under a string key. `FileStore`
//! keeps one file per key; `MemoryStore` is the in-process double used
//! by tests and one-shot sessions.
//!
//! Backends also hand out named claims: exclusive markers that every
//! handle on the same backend sees, so two sessions cannot run the same
//! guarded step at once.

use crate::error::StoreError;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// A claim file older than this was left behind by a session that died.
const CLAIM_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Raw string slots keyed by name.
pub trait KeyValueStore: Send + Sync {
    /// Reads a slot. `Ok(None)` when nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces a slot's contents.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes a slot. Deleting a missing slot is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Takes the claim `name`. `Ok(false)` when it is already held.
    fn try_claim(&self, name: &str) -> Result<bool, StoreError>;

    /// Gives a claim back. Releasing an unheld claim is not an error.
    fn release(&self, name: &str) -> Result<(), StoreError>;
}

/// Encodes `raw` so that distinct inputs give distinct names made only of
/// `[A-Za-z0-9._-]` and `%XX` escapes.
pub(crate) fn encode_name(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
        .replace('+', "%20")
}

fn check_quota(
    key: &str,
    others: usize,
    value: &str,
    quota: Option<usize>,
) -> Result<(), StoreError> {
    let Some(limit) = quota else {
        return Ok(());
    };
    let needed = others + key.len() + value.len();
    if needed > limit {
        return Err(StoreError::QuotaExceeded {
            key: key.to_string(),
            needed,
            limit,
        });
    }
    Ok(())
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
    claims: Mutex<HashSet<String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes once keys plus values exceed
    /// `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave a half-written String
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut slots = self.lock();
        let others: usize = slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        check_quota(key, others, value, self.quota_bytes)?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    fn try_claim(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string()))
    }

    fn release(&self, name: &str) -> Result<(), StoreError> {
        self.claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        Ok(())
    }
}

/// Store backed by a directory, one `<key>.json` file per slot.
///
/// Claims are `claims/<name>.lock` files created exclusively, so they hold
/// across every process using the directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStore {
    /// Opens (and creates if needed) a state directory.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir.join("claims"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            quota_bytes: None,
        })
    }

    /// Limits the total size of all slots in the directory.
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a key to its file. Characters outside `[A-Za-z0-9._-]` are
    /// percent-escaped.
    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_name(key)))
    }

    fn claim_path(&self, name: &str) -> PathBuf {
        self.dir
            .join("claims")
            .join(format!("{}.lock", encode_name(name)))
    }

    fn used_bytes_except(&self, skip: &Path) -> Result<usize, StoreError> {
        let mut total = 0usize;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem_len = path
                .file_stem()
                .map(|s| s.len())
                .unwrap_or_default();
            total += stem_len + entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.slot_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadError(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        if self.quota_bytes.is_some() {
            let others = self.used_bytes_except(&path)?;
            check_quota(key, others, value, self.quota_bytes)?;
        }

        std::fs::write(&path, value).map_err(|e| StoreError::WriteFailure {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.slot_path(key), key)
    }

    fn try_claim(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.claim_path(name);
        // Second pass only after clearing a stale claim.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !claim_is_stale(&path)? {
                        return Ok(false);
                    }
                    tracing::warn!(claim = name, "clearing stale claim");
                    remove_if_present(&path, name)?;
                }
                Err(e) => {
                    return Err(StoreError::WriteFailure {
                        key: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(false)
    }

    fn release(&self, name: &str) -> Result<(), StoreError> {
        remove_if_present(&self.claim_path(name), name)
    }
}

fn remove_if_present(path: &Path, key: &str) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::WriteFailure {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn claim_is_stale(path: &Path) -> Result<bool, StoreError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta
            .modified()?
            .elapsed()
            .is_ok_and(|age| age > CLAIM_STALE_AFTER)),
        // Released in the meantime
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(StoreError::ReadError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let err = store.set("other", "123456").unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(store.get("other").unwrap(), None);

        // Overwriting the same key only counts the new value
        store.set("k", "123456789").unwrap();
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("eaders-bookmarks", r#"{"s1":true}"#).unwrap();
        assert_eq!(
            store.get("eaders-bookmarks").unwrap().as_deref(),
            Some(r#"{"s1":true}"#)
        );
        assert!(dir.path().join("eaders-bookmarks.json").exists());

        store.remove("eaders-bookmarks").unwrap();
        assert_eq!(store.get("eaders-bookmarks").unwrap(), None);
    }

    #[test]
    fn test_file_store_escapes_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("a/b:c", "x").unwrap();
        assert!(dir.path().join("a%2Fb%3Ac.json").exists());
        assert_eq!(store.get("a/b:c").unwrap().as_deref(), Some("x"));

        store.set("a_b_c", "y").unwrap();
        store.set("a b", "z").unwrap();
        store.set("a+b", "w").unwrap();
        assert_eq!(store.get("a/b:c").unwrap().as_deref(), Some("x"));
        assert_eq!(store.get("a b").unwrap().as_deref(), Some("z"));
        assert_eq!(store.get("a+b").unwrap().as_deref(), Some("w"));
    }

    #[test]
    fn test_encode_name_keeps_plain_keys() {
        assert_eq!(encode_name("eaders-colorized-u1-b.1"), "eaders-colorized-u1-b.1");
        assert_eq!(encode_name("50%"), "50%25");
        assert_eq!(encode_name("a*b"), "a%2Ab");
    }

    #[test]
    fn test_memory_claims() {
        let store = MemoryStore::new();
        assert!(store.try_claim("page").unwrap());
        assert!(!store.try_claim("page").unwrap());
        assert!(store.try_claim("other").unwrap());

        store.release("page").unwrap();
        store.release("page").unwrap();
        assert!(store.try_claim("page").unwrap());
    }

    #[test]
    fn test_file_claims_shared_between_handles() {
        let dir = TempDir::new().unwrap();
        let first = FileStore::open(dir.path()).unwrap();
        let second = FileStore::open(dir.path()).unwrap();

        assert!(first.try_claim("eaders-colorized-u1-b:3").unwrap());
        assert!(!second.try_claim("eaders-colorized-u1-b:3").unwrap());

        first.release("eaders-colorized-u1-b:3").unwrap();
        assert!(second.try_claim("eaders-colorized-u1-b:3").unwrap());
    }

    #[test]
    fn test_stale_file_claim_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.try_claim("credits").unwrap());

        let old = std::time::SystemTime::now() - Duration::from_secs(60 * 60);
        std::fs::File::options()
            .write(true)
            .open(store.claim_path("credits"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert!(store.try_claim("credits").unwrap());
        assert!(!store.try_claim("credits").unwrap());
    }

    #[test]
    fn test_claims_do_not_count_toward_quota() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap().with_quota(16);
        assert!(store.try_claim("a-long-claim-name").unwrap());
        store.set("a", "0123456789").unwrap();
    }

    #[test]
    fn test_file_store_quota() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap().with_quota(16);

        store.set("a", "0123456789").unwrap();
        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
    }
}
