use super::{Backend, Versioned, check_version};
use crate::error::BackendError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Entries {
    values: BTreeMap<String, Versioned>,
    revision: u64,
}

/// Backend keeping every document in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<Entries>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Versioned, BackendError> {
        self.entries
            .read()
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<(Vec<(String, Versioned)>, u64), BackendError> {
        let entries = self.entries.read();
        let items = entries
            .values
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok((items, entries.revision))
    }

    fn create(&self, key: &str, value: Value) -> Result<u64, BackendError> {
        let mut entries = self.entries.write();
        if entries.values.contains_key(key) {
            return Err(BackendError::AlreadyExists(key.to_string()));
        }
        entries.revision += 1;
        let version = entries.revision;
        entries
            .values
            .insert(key.to_string(), Versioned { value, version });
        Ok(version)
    }

    fn update(&self, key: &str, value: Value, expected: u64) -> Result<u64, BackendError> {
        let mut entries = self.entries.write();
        let current = entries
            .values
            .get(key)
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;
        check_version(key, expected, current.version)?;

        entries.revision += 1;
        let version = entries.revision;
        entries
            .values
            .insert(key.to_string(), Versioned { value, version });
        Ok(version)
    }

    fn delete(&self, key: &str, expected: Option<u64>) -> Result<Versioned, BackendError> {
        let mut entries = self.entries.write();
        let current = entries
            .values
            .get(key)
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;
        if let Some(expected) = expected {
            check_version(key, expected, current.version)?;
        }
        entries.revision += 1;
        entries
            .values
            .remove(key)
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn revision(&self) -> u64 {
        self.entries.read().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compare_and_swap() {
        let backend = MemoryBackend::new();
        let v1 = backend.create("/r/a", json!({ "n": 1 })).unwrap();
        assert!(matches!(
            backend.create("/r/a", json!({})),
            Err(BackendError::AlreadyExists(_))
        ));

        let v2 = backend.update("/r/a", json!({ "n": 2 }), v1).unwrap();
        assert!(v2 > v1);
        assert!(matches!(
            backend.update("/r/a", json!({ "n": 3 }), v1),
            Err(BackendError::VersionConflict { expected, actual, .. }) if expected == v1 && actual == v2
        ));
        assert_eq!(backend.get("/r/a").unwrap().value, json!({ "n": 2 }));

        assert!(backend.delete("/r/a", Some(v1)).is_err());
        assert_eq!(backend.delete("/r/a", Some(v2)).unwrap().version, v2);
        assert!(backend.is_empty());
    }

    #[test]
    fn list_is_prefix_bounded() {
        let backend = MemoryBackend::new();
        backend.create("/r/flunders/a", json!(1)).unwrap();
        backend.create("/r/flunders/b", json!(2)).unwrap();
        backend.create("/r/flunders2/c", json!(3)).unwrap();
        backend.create("/r/fleets/d", json!(4)).unwrap();

        let (items, revision) = backend.list("/r/flunders/").unwrap();
        let keys: Vec<_> = items.into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["/r/flunders/a", "/r/flunders/b"]);
        assert_eq!(revision, 4);
    }
}
