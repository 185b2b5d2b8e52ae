use super::{Backend, Versioned, check_version};
use crate::error::BackendError;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Backend storing one JSON document per key under a root directory.
///
/// Key segments become directories, so `/registry/wardle.example.com/flunders/default/a`
/// is stored at `<root>/registry/wardle.example.com/flunders/default/a.json`.
/// Writes go through a temporary file and a rename. A single lock serializes
/// writers within the process.
#[derive(Debug)]
pub struct JsonFileBackend {
    root: PathBuf,
    revision: Mutex<u64>,
}

impl JsonFileBackend {
    /// Opens (creating if needed) a backend rooted at `root`.
    ///
    /// The revision resumes from the highest version found on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// document cannot be read.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut revision = 0;
        for (_, stored) in read_tree(&root, &root)? {
            revision = revision.max(stored.version);
        }
        tracing::debug!(root = %root.display(), revision, "opened json file backend");

        Ok(Self {
            root,
            revision: Mutex::new(revision),
        })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let (dir, name) = key.rsplit_once('/').unwrap_or(("", key));
        let mut path = self.dir_for(dir);
        path.push(format!("{name}.{EXTENSION}"));
        path
    }

    /// Directory holding the keys below `prefix`.
    fn dir_for(&self, prefix: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(prefix.split('/').filter(|s| !s.is_empty()));
        path
    }

    fn read(&self, key: &str) -> Result<Versioned, BackendError> {
        read_file(&self.path_for(key))?.ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn write(&self, key: &str, stored: &Versioned) -> Result<(), BackendError> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(stored)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Option<Versioned>, BackendError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads every document below `dir`, keyed relative to `root`.
fn read_tree(root: &Path, dir: &Path) -> Result<Vec<(String, Versioned)>, BackendError> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            found.extend(read_tree(root, &path)?);
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(stored) = read_file(&path)? else {
            continue;
        };
        let Ok(relative) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .fold(String::new(), |key, segment| format!("{key}/{segment}"));
        found.push((key, stored));
    }
    Ok(found)
}

impl Backend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Versioned, BackendError> {
        self.read(key)
    }

    fn list(&self, prefix: &str) -> Result<(Vec<(String, Versioned)>, u64), BackendError> {
        let revision = self.revision.lock();
        let dir = self.dir_for(prefix.rsplit_once('/').map_or("", |(dir, _)| dir));
        let mut items: Vec<_> = read_tree(&self.root, &dir)?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok((items, *revision))
    }

    fn create(&self, key: &str, value: Value) -> Result<u64, BackendError> {
        let mut revision = self.revision.lock();
        if read_file(&self.path_for(key))?.is_some() {
            return Err(BackendError::AlreadyExists(key.to_string()));
        }
        let version = *revision + 1;
        self.write(key, &Versioned { value, version })?;
        *revision = version;
        Ok(version)
    }

    fn update(&self, key: &str, value: Value, expected: u64) -> Result<u64, BackendError> {
        let mut revision = self.revision.lock();
        let current = self.read(key)?;
        check_version(key, expected, current.version)?;

        let version = *revision + 1;
        self.write(key, &Versioned { value, version })?;
        *revision = version;
        Ok(version)
    }

    fn delete(&self, key: &str, expected: Option<u64>) -> Result<Versioned, BackendError> {
        let mut revision = self.revision.lock();
        let current = self.read(key)?;
        if let Some(expected) = expected {
            check_version(key, expected, current.version)?;
        }
        fs::remove_file(self.path_for(key))?;
        *revision += 1;
        Ok(current)
    }

    fn revision(&self) -> u64 {
        *self.revision.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn documents_live_under_key_paths() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).unwrap();

        let version = backend
            .create("/registry/flunders/default/a", json!({ "spec": 1 }))
            .unwrap();
        let path = dir.path().join("registry/flunders/default/a.json");
        assert!(path.is_file());

        let stored: Versioned = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(stored.version, version);
        assert_eq!(stored.value, json!({ "spec": 1 }));
    }

    #[test]
    fn compare_and_swap_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).unwrap();

        let a = backend.create("/r/flunders/ns1/a", json!("a")).unwrap();
        backend.create("/r/flunders/ns2/b", json!("b")).unwrap();
        backend.create("/r/fleets/ns1/c", json!("c")).unwrap();

        assert!(matches!(
            backend.update("/r/flunders/ns1/a", json!("a2"), a + 10),
            Err(BackendError::VersionConflict { .. })
        ));
        backend.update("/r/flunders/ns1/a", json!("a2"), a).unwrap();

        let (all, revision) = backend.list("/r/flunders/").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "/r/flunders/ns1/a");
        assert_eq!(all[0].1.value, json!("a2"));
        assert_eq!(revision, 4);

        let (ns2, _) = backend.list("/r/flunders/ns2/").unwrap();
        assert_eq!(ns2.len(), 1);

        backend.delete("/r/flunders/ns2/b", None).unwrap();
        assert!(matches!(
            backend.get("/r/flunders/ns2/b"),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn revision_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = JsonFileBackend::open(dir.path()).unwrap();
            backend.create("/r/a", json!(1)).unwrap();
            backend.create("/r/b", json!(2)).unwrap();
        }
        let reopened = JsonFileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.revision(), 2);
        assert_eq!(reopened.create("/r/c", json!(3)).unwrap(), 3);
    }
}
