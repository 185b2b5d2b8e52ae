//! Storage providers and the singleton wrapper that shares them.
//!
//! A [`StorageProvider`] is the one extension point through which a resource
//! or subresource plugs into the registry: given the scheme and the options
//! source, it builds the handle that serves requests.
//!
//! [`SingletonProvider`] makes a provider idempotent. The first call runs the
//! wrapped provider, every other call (concurrent or later) waits for and
//! receives the same handle, or the same error:
//!
//! ```
//! use apiary_builder::provider::{SingletonProvider, StorageProvider};
//! use apiary_runtime::Scheme;
//! use apiary_storage::config::{RestOptionsGetter, StorageConfig, StorageOptions};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! # use apiary_runtime::{Object, ObjectMeta, TypedObject};
//! # use apiary_storage::rest::Storage;
//! # #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
//! # struct Fortune { #[serde(default)] metadata: ObjectMeta }
//! # impl TypedObject for Fortune {
//! #     const KIND: &'static str = "Fortune";
//! #     fn object_meta(&self) -> &ObjectMeta { &self.metadata }
//! #     fn object_meta_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
//! # }
//! # struct Fortunes;
//! # impl Storage for Fortunes {
//! #     fn new_object(&self) -> Box<dyn Object> { Box::new(Fortune::default()) }
//! # }
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = calls.clone();
//! let provider: StorageProvider = Arc::new(move |_: &Scheme, _: &dyn RestOptionsGetter| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(Arc::new(Fortunes) as Arc<dyn Storage>)
//! });
//!
//! let singleton = SingletonProvider::new("fortunes.wardle.example.com", provider);
//! let (scheme, options) = (Scheme::new(), StorageOptions::new(StorageConfig::default()));
//! let first = singleton.get(&scheme, &options).unwrap();
//! let second = singleton.get(&scheme, &options).unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! ```

use crate::descriptor::ResourceDescriptor;
use crate::error::{ConfigError, RegistryError};
use apiary_runtime::{GroupResource, Scheme};
use apiary_storage::config::RestOptionsGetter;
use apiary_storage::rest::Storage;
use apiary_storage::store::{Store, StoreFn};
use apiary_storage::strategy::Strategy;
use core::fmt;
use std::sync::{Arc, OnceLock};

/// Builds the handle serving a resource or subresource.
pub type StorageProvider = Arc<
    dyn Fn(&Scheme, &dyn RestOptionsGetter) -> Result<Arc<dyn Storage>, RegistryError> + Send + Sync,
>;

// ─────────────────────────────────────────────────────────────────────────────
// SingletonProvider
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a [`StorageProvider`] at most once and shares the outcome.
///
/// Clones share the same construction state. A failed construction is never
/// retried: every caller receives the first error.
#[derive(Clone)]
pub struct SingletonProvider {
    inner: Arc<SingletonInner>,
}

struct SingletonInner {
    name: String,
    provider: StorageProvider,
    outcome: OnceLock<Result<Arc<dyn Storage>, RegistryError>>,
}

impl SingletonProvider {
    /// Wraps `provider`. `name` identifies the resource in logs.
    #[must_use]
    pub fn new(name: impl Into<String>, provider: StorageProvider) -> Self {
        Self {
            inner: Arc::new(SingletonInner {
                name: name.into(),
                provider,
                outcome: OnceLock::new(),
            }),
        }
    }

    /// Returns the shared handle, constructing it on the first call.
    ///
    /// Concurrent first callers block until the single construction
    /// finishes.
    ///
    /// # Errors
    ///
    /// Returns the construction error, the same one on every call.
    pub fn get(
        &self,
        scheme: &Scheme,
        options: &dyn RestOptionsGetter,
    ) -> Result<Arc<dyn Storage>, RegistryError> {
        self.inner
            .outcome
            .get_or_init(|| {
                let outcome = (self.inner.provider)(scheme, options);
                match &outcome {
                    Ok(_) => tracing::debug!(resource = %self.inner.name, "constructed storage"),
                    Err(error) => tracing::warn!(
                        resource = %self.inner.name,
                        error = %error,
                        "storage construction failed"
                    ),
                }
                outcome
            })
            .clone()
    }

    /// Returns `true` once construction has completed, successfully or not.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// The resource name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` if both wrap the same construction state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Exposes the singleton as a plain provider.
    #[must_use]
    pub fn as_provider(&self) -> StorageProvider {
        let this = self.clone();
        Arc::new(move |scheme: &Scheme, options: &dyn RestOptionsGetter| {
            this.get(scheme, options)
        })
    }
}

impl fmt::Debug for SingletonProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonProvider")
            .field("name", &self.inner.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Default providers
// ─────────────────────────────────────────────────────────────────────────────

/// Serves an already constructed handle.
#[must_use]
pub fn static_handler(handler: Arc<dyn Storage>) -> StorageProvider {
    Arc::new(move |_: &Scheme, _: &dyn RestOptionsGetter| Ok(handler.clone()))
}

/// Builds a generic [`Store`] for the descriptor's storage type.
///
/// `strategy` defaults to the descriptor's own, and `store_fn` may adjust
/// the store before its backend is resolved.
///
/// # Errors
///
/// Returns [`ConfigError::MissingConverter`] if the descriptor has no
/// storage type.
pub fn store_provider(
    descriptor: &ResourceDescriptor,
    strategy: Option<Arc<dyn Strategy>>,
    store_fn: Option<StoreFn>,
) -> Result<StorageProvider, ConfigError> {
    let gvr = descriptor.group_version_resource();
    store_provider_for(descriptor, gvr.group_resource(), strategy, store_fn)
}

/// Builds a generic [`Store`] over the parent's storage type, keyed under
/// `parent/path`.
///
/// # Errors
///
/// Returns [`ConfigError::MissingConverter`] if the parent has no storage type.
pub fn subresource_store_provider(
    parent: &ResourceDescriptor,
    path: &str,
    strategy: Option<Arc<dyn Strategy>>,
) -> Result<StorageProvider, ConfigError> {
    let gvr = parent.group_version_resource().with_subresource(path);
    store_provider_for(parent, gvr.group_resource(), strategy, None)
}

fn store_provider_for(
    descriptor: &ResourceDescriptor,
    resource: GroupResource,
    strategy: Option<Arc<dyn Strategy>>,
    store_fn: Option<StoreFn>,
) -> Result<StorageProvider, ConfigError> {
    let storage = descriptor
        .storage_type()
        .cloned()
        .ok_or_else(|| ConfigError::MissingConverter {
            resource: descriptor.group_version_resource().clone(),
        })?;
    let strategy = strategy.unwrap_or_else(|| descriptor.default_strategy());

    Ok(Arc::new(move |scheme: &Scheme, options: &dyn RestOptionsGetter| {
        let mut store = Store::new(
            resource.clone(),
            storage.new_fn.clone(),
            storage.list_kind.clone(),
            strategy.clone(),
        );
        if let Some(customize) = &store_fn {
            customize(scheme, &mut store)?;
        }
        store.complete_with_options(options)?;
        Ok(Arc::new(store) as Arc<dyn Storage>)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_runtime::{Object, ObjectMeta, TypedObject};
    use apiary_storage::StorageError;
    use apiary_storage::config::{StorageConfig, StorageOptions};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Fortune {
        #[serde(default)]
        metadata: ObjectMeta,
    }

    impl TypedObject for Fortune {
        const KIND: &'static str = "Fortune";
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    struct Fortunes;

    impl Storage for Fortunes {
        fn new_object(&self) -> Box<dyn Object> {
            Box::new(Fortune::default())
        }
    }

    fn options() -> StorageOptions {
        StorageOptions::new(StorageConfig::default())
    }

    #[test]
    fn failure_is_sticky() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let singleton = SingletonProvider::new(
            "fortunes",
            Arc::new(move |_: &Scheme, _: &dyn RestOptionsGetter| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Unavailable("backend down".into()).into())
            }),
        );

        assert!(!singleton.is_initialized());
        let scheme = Scheme::new();
        let first = singleton.get(&scheme, &options()).unwrap_err();
        let second = singleton.get(&scheme, &options()).unwrap_err();
        assert_eq!(first, second);
        assert!(singleton.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn as_provider_shares_state() {
        let singleton = SingletonProvider::new("fortunes", static_handler(Arc::new(Fortunes)));
        let provider = singleton.as_provider();
        let scheme = Scheme::new();

        let direct = singleton.get(&scheme, &options()).unwrap();
        let wrapped = provider(&scheme, &options()).unwrap();
        assert!(Arc::ptr_eq(&direct, &wrapped));
        assert!(singleton.ptr_eq(&singleton.clone()));
    }
}
