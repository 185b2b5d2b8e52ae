//! Storage plugin.
//!
//! Provides [`StoragePlugin`] which turns a [`StorageConfig`] into the
//! server-wide [`StorageOptions`] every default store resolves its backend
//! from.
//!
//! # Example
//!
//! ```
//! use apiary_storage::config::StorageOptions;
//! use apiary_storage::plugin::StoragePlugin;
//! use apiary_system::server::Server;
//!
//! let mut server = Server::new();
//! server.add_plugins(StoragePlugin::default().with_prefix("/wardle"));
//! server.finish();
//!
//! let options = server.get_global::<StorageOptions>().unwrap();
//! assert_eq!(options.config().prefix, "/wardle");
//! ```

use crate::backend::Backend;
use crate::config::{BackendConfig, StorageConfig, StorageOptions};
use apiary_system::plugin::Plugin;
use apiary_system::server::Server;
use std::sync::Arc;

/// Storage configuration plugin.
///
/// # State Provided
///
/// | State | Scope | Description |
/// |-------|-------|-------------|
/// | [`StorageOptions`] | Global | Options source of every default store |
#[derive(Debug, Clone, Default)]
pub struct StoragePlugin {
    config: StorageConfig,
    backend: Option<Arc<dyn Backend>>,
}

impl StoragePlugin {
    /// Creates the plugin from a configuration.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Selects the persistence engine.
    #[must_use]
    pub fn with_backend_config(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Uses an already opened backend instead of the configured one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }
}

impl Plugin for StoragePlugin {
    fn build(&self, server: &mut Server) {
        let options = match &self.backend {
            Some(backend) => StorageOptions::with_backend(self.config.clone(), backend.clone()),
            None => StorageOptions::new(self.config.clone()),
        };
        tracing::debug!(config = ?self.config, "storage options installed");
        server.insert_global(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::RestOptionsGetter;
    use apiary_runtime::GroupResource;

    #[test]
    fn provided_backend_is_shared() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let mut server = Server::new();
        server.add_plugins(StoragePlugin::default().with_backend(backend.clone()));
        server.finish();

        let options = server.get_global::<StorageOptions>().unwrap();
        let rest = options
            .rest_options(&GroupResource::new("wardle.example.com", "flunders"))
            .unwrap();
        assert!(Arc::ptr_eq(&rest.backend, &backend));
    }
}
