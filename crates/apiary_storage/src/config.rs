//! Storage configuration and the per-resource options source.
//!
//! ```
//! use apiary_storage::config::{BackendConfig, StorageConfig};
//!
//! let config = StorageConfig::from_json(
//!     r#"{ "backend": { "type": "jsonFile", "root": "/var/lib/apiary" } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.prefix, "/registry");
//! assert!(matches!(config.backend, BackendConfig::JsonFile { .. }));
//! ```

use crate::backend::{Backend, JsonFileBackend, MemoryBackend};
use crate::error::StorageError;
use apiary_runtime::GroupResource;
use apiary_system::state::GlobalState;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Default key prefix of every stored object.
pub const DEFAULT_PREFIX: &str = "/registry";

/// Which persistence engine backs the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendConfig {
    /// Keep everything in process memory.
    #[default]
    Memory,
    /// One JSON file per object below `root`.
    JsonFile {
        /// Root directory.
        root: PathBuf,
    },
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// The persistence engine.
    pub backend: BackendConfig,
    /// Key prefix of every stored object.
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl StorageConfig {
    /// Parses a JSON configuration document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed documents.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options source
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a store needs to reach its data.
#[derive(Clone)]
pub struct RestOptions {
    /// The persistence engine.
    pub backend: Arc<dyn Backend>,
    /// Key prefix of the resource, e.g. `/registry/wardle.example.com/flunders`.
    pub resource_prefix: String,
}

impl fmt::Debug for RestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestOptions")
            .field("backend", &self.backend)
            .field("resource_prefix", &self.resource_prefix)
            .finish()
    }
}

/// Resolves the storage options of one resource.
pub trait RestOptionsGetter: Send + Sync {
    /// Returns the options of `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence engine cannot be reached.
    fn rest_options(&self, resource: &GroupResource) -> Result<RestOptions, StorageError>;
}

/// The server-wide [`RestOptionsGetter`], built from a [`StorageConfig`].
///
/// The backend is opened on first use and shared by every resource. A
/// failed open is remembered and returned to every later caller.
#[derive(Clone)]
pub struct StorageOptions {
    inner: Arc<StorageOptionsInner>,
}

struct StorageOptionsInner {
    config: StorageConfig,
    backend: OnceLock<Result<Arc<dyn Backend>, StorageError>>,
}

impl GlobalState for StorageOptions {}

impl StorageOptions {
    /// Creates an options source that opens the configured backend lazily.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            inner: Arc::new(StorageOptionsInner {
                config,
                backend: OnceLock::new(),
            }),
        }
    }

    /// Creates an options source over an already opened backend.
    #[must_use]
    pub fn with_backend(config: StorageConfig, backend: Arc<dyn Backend>) -> Self {
        let options = Self::new(config);
        let _ = options.inner.backend.set(Ok(backend));
        options
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    /// Returns the shared backend, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the backend cannot be opened.
    pub fn backend(&self) -> Result<Arc<dyn Backend>, StorageError> {
        self.inner
            .backend
            .get_or_init(|| open_backend(&self.inner.config.backend))
            .clone()
    }
}

fn open_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, StorageError> {
    match config {
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::JsonFile { root } => {
            let backend = JsonFileBackend::open(root.clone()).map_err(|e| {
                tracing::warn!(root = %root.display(), error = %e, "failed to open json file backend");
                StorageError::Io {
                    path: root.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(Arc::new(backend))
        }
    }
}

impl RestOptionsGetter for StorageOptions {
    fn rest_options(&self, resource: &GroupResource) -> Result<RestOptions, StorageError> {
        let prefix = self.inner.config.prefix.trim_end_matches('/');
        // Subresource stores get a sibling prefix, never one nested in the parent's.
        let name = resource.resource.replace('/', ".");
        let resource_prefix = if resource.group.is_empty() {
            format!("{prefix}/{name}")
        } else {
            format!("{prefix}/{}/{name}", resource.group)
        };
        Ok(RestOptions {
            backend: self.backend()?,
            resource_prefix,
        })
    }
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("config", &self.inner.config)
            .field("opened", &self.inner.backend.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = StorageConfig::from_json("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.backend, BackendConfig::Memory);

        let custom = StorageConfig::from_json(r#"{ "backend": { "type": "memory" }, "prefix": "/data" }"#)
            .unwrap();
        assert_eq!(custom.prefix, "/data");
        assert!(StorageConfig::from_json(r#"{ "backend": { "type": "etcd" } }"#).is_err());
    }

    #[test]
    fn resource_prefixes_share_one_backend() {
        let options = StorageOptions::new(StorageConfig::default());
        let flunders = options
            .rest_options(&GroupResource::new("wardle.example.com", "flunders"))
            .unwrap();
        let pods = options.rest_options(&GroupResource::new("", "pods")).unwrap();

        assert_eq!(flunders.resource_prefix, "/registry/wardle.example.com/flunders");
        assert_eq!(pods.resource_prefix, "/registry/pods");
        assert!(Arc::ptr_eq(&flunders.backend, &pods.backend));

        let sub = options
            .rest_options(&GroupResource::new("wardle.example.com", "flunders/history"))
            .unwrap();
        assert_eq!(sub.resource_prefix, "/registry/wardle.example.com/flunders.history");
    }

    #[test]
    fn failed_open_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let options = StorageOptions::new(StorageConfig {
            backend: BackendConfig::JsonFile { root: file },
            ..StorageConfig::default()
        });
        let gr = GroupResource::new("", "pods");
        let first = options.rest_options(&gr).unwrap_err();
        let second = options.rest_options(&gr).unwrap_err();
        assert!(matches!(first, StorageError::Io { .. }));
        assert_eq!(first, second);
    }
}
