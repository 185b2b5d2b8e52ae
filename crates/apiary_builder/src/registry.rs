//! The resource registry.
//!
//! API groups register their resources against a [`ResourceRegistry`] during
//! server build. Every version of a resource shares one
//! [`SingletonProvider`], keyed by group and resource name, so all versions
//! read and write the same objects through the same handle:
//!
//! ```text
//! wardle.example.com/v1alpha1/flunders ──┐
//!                                        ├──► SingletonProvider(flunders.wardle.example.com)
//! wardle.example.com/v1beta1/flunders  ──┘
//! ```
//!
//! Subresources get their own singleton, built over the parent's. Errors are
//! collected instead of raised, and [`finalize`](ResourceRegistry::finalize)
//! either returns a complete [`RouteTable`] or every error at once.

use crate::descriptor::{ArbitrarySubResource, ResourceDescriptor, SubResourceSource};
use crate::error::{AggregateError, ConfigError, RegistryError};
use crate::provider::{SingletonProvider, StorageProvider, store_provider, subresource_store_provider};
use crate::route::{Route, RouteTable};
use crate::scale::ScaleFns;
use crate::subresource::{AdapterKind, ResolvedAdapter, SCALE, STATUS, SubresourceShape, compose};
use apiary_runtime::{
    GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource, Object, Scale, Scheme,
};
use apiary_storage::config::RestOptionsGetter;
use apiary_storage::store::StoreFn;
use apiary_storage::strategy::{CopyStatusFn, Strategy};
use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

/// How a registration supplies its storage.
enum StorageSource {
    Default,
    Strategy(Arc<dyn Strategy>),
    Handler(StorageProvider),
    StoreFn(StoreFn),
}

impl StorageSource {
    fn variant(&self) -> &'static str {
        match self {
            Self::Default => "default store",
            Self::Strategy(_) => "strategy",
            Self::Handler(_) => "handler",
            Self::StoreFn(_) => "store customization",
        }
    }

    fn is_store_backed(&self) -> bool {
        !matches!(self, Self::Handler(_))
    }
}

/// Storage shared by every version of one resource.
struct Entry {
    singleton: SingletonProvider,
    canonical: Canonical,
    storage_kind: GroupVersionKind,
    store_backed: bool,
}

/// The descriptor a resource's store is built from.
///
/// Starts as the first registered version and is replaced once by the
/// storage version, if that registers later. Read when the store is
/// constructed, so it always sees the final registration.
type Canonical = Arc<RwLock<ResourceDescriptor>>;

impl Entry {
    fn kind(&self) -> &'static str {
        self.canonical.read().kind()
    }

    fn adopt_storage_version(&self, descriptor: &ResourceDescriptor) {
        let mut canonical = self.canonical.write();
        if descriptor.is_storage_version() && !canonical.is_storage_version() {
            tracing::debug!(
                resource = %descriptor.group_version_resource(),
                "storage version adopted for shared storage"
            );
            *canonical = descriptor.clone();
        }
    }

    fn copy_status(&self) -> Option<CopyStatusFn> {
        self.canonical.read().copy_status_fn()?;
        let canonical = self.canonical.clone();
        Some(Arc::new(move |from: &dyn Object, to: &mut dyn Object| {
            let copy = canonical.read().copy_status_fn().cloned();
            if let Some(copy) = copy {
                copy(from, to);
            }
        }))
    }

    fn scale_fns(&self) -> Option<ScaleFns> {
        self.canonical.read().scale_fns()?;
        let canonical = self.canonical.clone();
        Some(ScaleFns::deferred(move || canonical.read().scale_fns().cloned()))
    }
}

fn canonical_store_provider(
    canonical: Canonical,
    strategy: Option<Arc<dyn Strategy>>,
    store_fn: Option<StoreFn>,
) -> StorageProvider {
    Arc::new(move |scheme: &Scheme, options: &dyn RestOptionsGetter| {
        let descriptor = canonical.read().clone();
        let provider = store_provider(&descriptor, strategy.clone(), store_fn.clone())?;
        provider(scheme, options)
    })
}

/// Collects resource registrations during server build.
///
/// # Example
///
/// ```
/// use apiary_builder::descriptor::{Resource, ResourceDescriptor};
/// use apiary_builder::registry::ResourceRegistry;
/// use apiary_runtime::{GroupVersionResource, ObjectMeta, TypedObject};
/// use apiary_storage::config::{StorageConfig, StorageOptions};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Flunder {
///     #[serde(default)]
///     metadata: ObjectMeta,
/// }
///
/// impl TypedObject for Flunder {
///     const KIND: &'static str = "Flunder";
///     fn object_meta(&self) -> &ObjectMeta { &self.metadata }
///     fn object_meta_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
/// }
///
/// impl Resource for Flunder {
///     fn group_version_resource() -> GroupVersionResource {
///         GroupVersionResource::new("wardle.example.com", "v1alpha1", "flunders")
///     }
/// }
///
/// let mut registry = ResourceRegistry::new();
/// registry.register(ResourceDescriptor::of::<Flunder>());
///
/// let table = registry
///     .finalize(Arc::new(StorageOptions::new(StorageConfig::default())))
///     .unwrap();
/// let gvr = Flunder::group_version_resource();
/// assert!(table.route(&gvr).is_some());
/// assert!(table.storage(&gvr).is_ok());
/// ```
pub struct ResourceRegistry {
    scheme: Scheme,
    entries: HashMap<GroupResource, Entry>,
    versions: HashMap<GroupVersionResource, ResourceDescriptor>,
    subresources: HashMap<GroupResource, (SingletonProvider, ResolvedAdapter)>,
    group_versions: IndexSet<GroupVersion>,
    routes: IndexMap<GroupVersionResource, Route>,
    errors: Vec<RegistryError>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheme: Scheme::new(),
            entries: HashMap::new(),
            versions: HashMap::new(),
            subresources: HashMap::new(),
            group_versions: IndexSet::new(),
            routes: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a resource served by a default store.
    ///
    /// The first version registered for a group and resource name creates
    /// the shared storage. Every version other than the storage version must
    /// declare a conversion to it, so the store is always built over the
    /// storage type whichever version comes first.
    ///
    /// `status`, `scale` and the declared arbitrary subresources are
    /// registered along with the resource.
    pub fn register(&mut self, descriptor: impl Into<ResourceDescriptor>) -> &mut Self {
        self.add_resource(descriptor.into(), StorageSource::Default)
    }

    /// Registers a resource served by a default store using `strategy`.
    pub fn register_with_strategy(
        &mut self,
        descriptor: impl Into<ResourceDescriptor>,
        strategy: Arc<dyn Strategy>,
    ) -> &mut Self {
        self.add_resource(descriptor.into(), StorageSource::Strategy(strategy))
    }

    /// Registers a resource served by the handle `provider` builds.
    ///
    /// `status` and `scale` are not registered implicitly, since the handle
    /// need not be a store. Declared arbitrary subresources are.
    pub fn register_with_handler(
        &mut self,
        descriptor: impl Into<ResourceDescriptor>,
        provider: StorageProvider,
    ) -> &mut Self {
        self.add_resource(descriptor.into(), StorageSource::Handler(provider))
    }

    /// Registers a resource served by a default store that `store_fn`
    /// adjusts before its backend is resolved.
    pub fn register_with_store_fn(
        &mut self,
        descriptor: impl Into<ResourceDescriptor>,
        store_fn: StoreFn,
    ) -> &mut Self {
        self.add_resource(descriptor.into(), StorageSource::StoreFn(store_fn))
    }

    fn add_resource(&mut self, descriptor: ResourceDescriptor, source: StorageSource) -> &mut Self {
        if let Err(error) = self.try_add_resource(&descriptor, source) {
            self.fail(error);
            return self;
        }
        for subresource in descriptor.subresources() {
            self.register_subresource_with_handler(
                descriptor.group_version_resource().clone(),
                subresource.clone(),
            );
        }
        self
    }

    fn try_add_resource(
        &mut self,
        descriptor: &ResourceDescriptor,
        source: StorageSource,
    ) -> Result<(), ConfigError> {
        let gvr = descriptor.group_version_resource().clone();
        if self.routes.contains_key(&gvr) {
            return Err(ConfigError::DuplicateRoute { resource: gvr });
        }
        let storage_kind = descriptor
            .storage_kind()
            .cloned()
            .ok_or_else(|| ConfigError::MissingConverter {
                resource: gvr.clone(),
            })?;
        descriptor.install(&mut self.scheme)?;

        let key = gvr.group_resource();
        let store_backed = match self.entries.get(&key) {
            Some(entry) => {
                if !matches!(source, StorageSource::Default) {
                    return Err(ConfigError::ProviderConflict {
                        resource: gvr,
                        variant: source.variant(),
                    });
                }
                if entry.storage_kind != storage_kind {
                    return Err(ConfigError::StorageKindMismatch {
                        resource: gvr,
                        expected: entry.storage_kind.clone(),
                        found: storage_kind,
                    });
                }
                tracing::debug!(resource = %gvr, "sharing storage with an earlier version");
                if entry.store_backed {
                    entry.adopt_storage_version(descriptor);
                }
                entry.store_backed
            }
            None => {
                let store_backed = source.is_store_backed();
                let canonical: Canonical = Arc::new(RwLock::new(descriptor.clone()));
                let provider = match source {
                    StorageSource::Default => canonical_store_provider(canonical.clone(), None, None),
                    StorageSource::Strategy(strategy) => {
                        canonical_store_provider(canonical.clone(), Some(strategy), None)
                    }
                    StorageSource::StoreFn(store_fn) => {
                        canonical_store_provider(canonical.clone(), None, Some(store_fn))
                    }
                    StorageSource::Handler(provider) => provider,
                };
                self.entries.insert(
                    key.clone(),
                    Entry {
                        singleton: SingletonProvider::new(key.to_string(), provider),
                        canonical,
                        storage_kind: storage_kind.clone(),
                        store_backed,
                    },
                );
                store_backed
            }
        };

        let singleton = self.entry(&key).singleton.clone();
        self.add_route(Route {
            request_kind: descriptor.group_version_kind(),
            storage_kind,
            list_kind: descriptor.list_kind().to_string(),
            namespaced: descriptor.namespace_scoped(),
            adapter: None,
            provider: singleton,
            gvr: gvr.clone(),
        })?;
        self.versions.insert(gvr, descriptor.clone());

        if store_backed && descriptor.has_status() {
            self.add_reserved(descriptor, STATUS)?;
        }
        if store_backed && descriptor.has_scale() {
            self.add_reserved(descriptor, SCALE)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subresources
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers subresource `path` of `parent` with a default shape.
    ///
    /// `status` and `scale` get their built-in adapters. Any other path is
    /// served by a store over the parent's storage type, with the parent
    /// bound into every call.
    pub fn register_subresource(&mut self, parent: GroupVersionResource, path: &str) -> &mut Self {
        let result = self.parent_descriptor(&parent, path).and_then(|descriptor| {
            if AdapterKind::for_path(path).is_some() {
                return self.add_reserved(&descriptor, path);
            }
            let provider = subresource_store_provider(&descriptor, path, None)?;
            self.add_subresource(&descriptor, path, None, SubresourceShape::Provider(provider))
        });
        self.record(result)
    }

    /// Registers subresource `path` of `parent` served by a store over the
    /// parent's storage type using `strategy`.
    pub fn register_subresource_with_strategy(
        &mut self,
        parent: GroupVersionResource,
        path: &str,
        strategy: Arc<dyn Strategy>,
    ) -> &mut Self {
        let result = self.parent_descriptor(&parent, path).and_then(|descriptor| {
            self.reject_reserved(&parent, path)?;
            let provider = subresource_store_provider(&descriptor, path, Some(strategy))?;
            self.add_subresource(&descriptor, path, None, SubresourceShape::Provider(provider))
        });
        self.record(result)
    }

    /// Registers a subresource of `parent` with its own storage.
    pub fn register_subresource_with_handler(
        &mut self,
        parent: GroupVersionResource,
        subresource: ArbitrarySubResource,
    ) -> &mut Self {
        let path = subresource.path().to_string();
        let result = self.parent_descriptor(&parent, &path).and_then(|descriptor| {
            self.reject_reserved(&parent, &path)?;
            subresource.install(&mut self.scheme, &parent.group_version())?;
            let shape = match subresource.source() {
                SubResourceSource::Handler(handler) => SubresourceShape::Handler(handler.clone()),
                SubResourceSource::Provider(provider) => SubresourceShape::Provider(provider.clone()),
            };
            self.add_subresource(&descriptor, &path, subresource.request_kind(), shape)
        });
        self.record(result)
    }

    /// Validates `path` and returns the descriptor `parent` was registered with.
    fn parent_descriptor(
        &self,
        parent: &GroupVersionResource,
        path: &str,
    ) -> Result<ResourceDescriptor, ConfigError> {
        if path.is_empty() || path.contains('/') || parent.is_subresource() {
            return Err(ConfigError::InvalidSubresourcePath {
                parent: parent.clone(),
                path: path.to_string(),
            });
        }
        self.versions
            .get(parent)
            .cloned()
            .ok_or_else(|| ConfigError::ParentNotRegistered {
                parent: parent.clone(),
                path: path.to_string(),
            })
    }

    fn reject_reserved(&self, parent: &GroupVersionResource, path: &str) -> Result<(), ConfigError> {
        match AdapterKind::for_path(path) {
            Some(_) => Err(ConfigError::ReservedSubresource {
                parent: parent.clone(),
                path: path.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Adds the `status` or `scale` route of `descriptor`'s version.
    fn add_reserved(&mut self, descriptor: &ResourceDescriptor, path: &str) -> Result<(), ConfigError> {
        let gvr = descriptor.group_version_resource();
        let sub_gvr = gvr.with_subresource(path);
        let entry = self.entry(&gvr.group_resource());
        let missing = |declaration: &'static str| ConfigError::MissingObjectCapability {
            resource: sub_gvr.clone(),
            kind: entry.kind(),
            declaration,
        };

        let (shape, request_kind) = if path == STATUS {
            let copy_status = entry.copy_status().ok_or_else(|| missing(STATUS))?;
            (SubresourceShape::Status(copy_status), descriptor.group_version_kind())
        } else {
            let fns = entry.scale_fns().ok_or_else(|| missing(SCALE))?;
            (SubresourceShape::Scale(fns), Scale::group_version_kind())
        };
        self.add_subresource_route(descriptor, path, request_kind, shape)
    }

    fn add_subresource(
        &mut self,
        descriptor: &ResourceDescriptor,
        path: &str,
        request_kind: Option<&'static str>,
        shape: SubresourceShape,
    ) -> Result<(), ConfigError> {
        let gvr = descriptor.group_version_resource();
        let request_kind = request_kind.map_or_else(
            || descriptor.group_version_kind(),
            |kind| gvr.group_version().with_kind(kind),
        );
        self.add_subresource_route(descriptor, path, request_kind, shape)
    }

    /// Routes `descriptor`'s version of subresource `path`, reusing the
    /// subresource singleton of another version if there is one.
    fn add_subresource_route(
        &mut self,
        descriptor: &ResourceDescriptor,
        path: &str,
        request_kind: GroupVersionKind,
        shape: SubresourceShape,
    ) -> Result<(), ConfigError> {
        let gvr = descriptor.group_version_resource().with_subresource(path);
        let entry = self.entry(&gvr.parent().group_resource());
        let parent = entry.singleton.clone();
        let storage_kind = if request_kind.kind == entry.kind() {
            entry.storage_kind.clone()
        } else {
            request_kind.clone()
        };
        let (provider, adapter) = self
            .subresources
            .entry(gvr.group_resource())
            .or_insert_with(|| {
                let resolved: ResolvedAdapter = Arc::new(OnceLock::new());
                if let Some(kind) = shape.kind() {
                    resolved.get_or_init(|| kind);
                }
                let provider = compose(gvr.clone(), parent, shape, resolved.clone());
                (SingletonProvider::new(gvr.group_resource().to_string(), provider), resolved)
            })
            .clone();
        self.add_route(Route {
            request_kind,
            storage_kind,
            list_kind: descriptor.list_kind().to_string(),
            namespaced: descriptor.namespace_scoped(),
            adapter: Some(adapter),
            provider,
            gvr,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    fn entry(&self, key: &GroupResource) -> &Entry {
        self.entries
            .get(key)
            .unwrap_or_else(|| panic!("resource {key} has no storage entry"))
    }

    fn add_route(&mut self, route: Route) -> Result<(), ConfigError> {
        if self.routes.contains_key(&route.gvr) {
            return Err(ConfigError::DuplicateRoute { resource: route.gvr });
        }
        tracing::debug!(resource = %route.gvr, kind = %route.request_kind, "registered route");
        self.group_versions.insert(route.gvr.group_version());
        self.routes.insert(route.gvr.clone(), route);
        Ok(())
    }

    fn record(&mut self, result: Result<(), ConfigError>) -> &mut Self {
        if let Err(error) = result {
            self.fail(error);
        }
        self
    }

    fn fail(&mut self, error: ConfigError) {
        tracing::debug!(error = %error, "registration rejected");
        self.errors.push(error.into());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The type registry being populated.
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Mutable access to the type registry, for kinds registered outside a
    /// descriptor.
    pub fn scheme_mut(&mut self) -> &mut Scheme {
        &mut self.scheme
    }

    /// Registered group versions, in first-seen order.
    pub fn group_versions(&self) -> impl Iterator<Item = &GroupVersion> {
        self.group_versions.iter()
    }

    /// Errors collected so far.
    #[must_use]
    pub fn errors(&self) -> &[RegistryError] {
        &self.errors
    }

    /// Returns `true` if a route exists at `gvr`.
    #[must_use]
    pub fn is_registered(&self, gvr: &GroupVersionResource) -> bool {
        self.routes.contains_key(gvr)
    }

    /// The provider shared by every version of `resource`, or of the
    /// subresource when `resource` names one, e.g. `flunders/status`.
    #[must_use]
    pub fn storage_provider(&self, resource: &GroupResource) -> Option<&SingletonProvider> {
        self.entries
            .get(resource)
            .map(|entry| &entry.singleton)
            .or_else(|| self.subresources.get(resource).map(|(singleton, _)| singleton))
    }

    /// Fixes the route table.
    ///
    /// Sets each group's version priority to the order its versions were
    /// first registered in.
    ///
    /// # Errors
    ///
    /// Returns every collected registration error. Nothing is served unless
    /// every registration succeeded.
    pub fn finalize(mut self, options: Arc<dyn RestOptionsGetter>) -> Result<RouteTable, AggregateError> {
        let mut by_group: IndexMap<&str, Vec<GroupVersion>> = IndexMap::new();
        for gv in &self.group_versions {
            by_group.entry(gv.group.as_str()).or_default().push(gv.clone());
        }
        for versions in by_group.values() {
            if let Err(error) = self.scheme.set_version_priority(versions) {
                self.errors.push(error.into());
            }
        }

        if !self.errors.is_empty() {
            tracing::warn!(errors = self.errors.len(), "route table rejected");
            return Err(AggregateError::new(self.errors));
        }
        tracing::info!(
            routes = self.routes.len(),
            group_versions = self.group_versions.len(),
            "route table finalized"
        );
        Ok(RouteTable::new(
            self.scheme,
            self.group_versions.into_iter().collect(),
            self.routes,
            options,
        ))
    }
}

impl core::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.entries.len())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
