//! The finalized route table.

use crate::error::{AggregateError, RegistryError};
use crate::provider::SingletonProvider;
use crate::subresource::{AdapterKind, ResolvedAdapter};
use apiary_runtime::{GroupVersion, GroupVersionKind, GroupVersionResource, Scheme};
use apiary_storage::config::RestOptionsGetter;
use apiary_storage::rest::Storage;
use apiary_system::state::GlobalState;
use indexmap::IndexMap;
use std::sync::Arc;

/// One servable resource or subresource at one version.
#[derive(Debug, Clone)]
pub struct Route {
    pub(crate) gvr: GroupVersionResource,
    pub(crate) request_kind: GroupVersionKind,
    pub(crate) storage_kind: GroupVersionKind,
    pub(crate) list_kind: String,
    pub(crate) namespaced: bool,
    pub(crate) adapter: Option<ResolvedAdapter>,
    pub(crate) provider: SingletonProvider,
}

impl Route {
    /// Where the route is served.
    #[must_use]
    pub fn group_version_resource(&self) -> &GroupVersionResource {
        &self.gvr
    }

    /// Kind of request and response bodies.
    #[must_use]
    pub fn request_kind(&self) -> &GroupVersionKind {
        &self.request_kind
    }

    /// Kind the handle reads and writes.
    #[must_use]
    pub fn storage_kind(&self) -> &GroupVersionKind {
        &self.storage_kind
    }

    /// Kind of list responses.
    #[must_use]
    pub fn list_kind(&self) -> &str {
        &self.list_kind
    }

    /// Whether requests must name a namespace.
    #[must_use]
    pub fn namespace_scoped(&self) -> bool {
        self.namespaced
    }

    /// Adapter shape of a subresource route.
    ///
    /// `None` for resources. A provider-backed subresource reports `None`
    /// until its first construction resolves the shape.
    #[must_use]
    pub fn adapter(&self) -> Option<AdapterKind> {
        self.adapter.as_ref().and_then(|resolved| resolved.get().copied())
    }

    /// The shared provider.
    #[must_use]
    pub fn provider(&self) -> &SingletonProvider {
        &self.provider
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RouteTable
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only routes produced by
/// [`ResourceRegistry::finalize`](crate::registry::ResourceRegistry::finalize).
///
/// Cheap to clone. Every clone resolves handles through the same singletons.
#[derive(Clone)]
pub struct RouteTable {
    inner: Arc<RouteTableInner>,
}

struct RouteTableInner {
    scheme: Scheme,
    group_versions: Vec<GroupVersion>,
    routes: IndexMap<GroupVersionResource, Route>,
    options: Arc<dyn RestOptionsGetter>,
}

impl GlobalState for RouteTable {}

impl RouteTable {
    pub(crate) fn new(
        scheme: Scheme,
        group_versions: Vec<GroupVersion>,
        routes: IndexMap<GroupVersionResource, Route>,
        options: Arc<dyn RestOptionsGetter>,
    ) -> Self {
        Self {
            inner: Arc::new(RouteTableInner {
                scheme,
                group_versions,
                routes,
                options,
            }),
        }
    }

    /// The route serving `gvr`.
    #[must_use]
    pub fn route(&self, gvr: &GroupVersionResource) -> Option<&Route> {
        self.inner.routes.get(gvr)
    }

    /// Every route, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.inner.routes.values()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.routes.len()
    }

    /// Returns `true` if nothing is routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.routes.is_empty()
    }

    /// The type registry.
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.inner.scheme
    }

    /// Every registered group version, in first-seen order.
    #[must_use]
    pub fn group_versions(&self) -> &[GroupVersion] {
        &self.inner.group_versions
    }

    /// Resolves the handle serving `gvr`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownRoute`] if nothing is routed at `gvr`
    /// - the provider's construction error, the same one on every call
    pub fn storage(&self, gvr: &GroupVersionResource) -> Result<Arc<dyn Storage>, RegistryError> {
        let route = self
            .route(gvr)
            .ok_or_else(|| RegistryError::UnknownRoute(gvr.clone()))?;
        route
            .provider
            .get(&self.inner.scheme, self.inner.options.as_ref())
    }

    /// Constructs every handle now instead of on first use.
    ///
    /// # Errors
    ///
    /// Returns every distinct construction error.
    pub fn prepare(&self) -> Result<(), AggregateError> {
        let mut errors: Vec<RegistryError> = Vec::new();
        for route in self.routes() {
            if let Err(error) = self.storage(&route.gvr)
                && !errors.contains(&error)
            {
                errors.push(error);
            }
        }
        tracing::debug!(routes = self.len(), failed = errors.len(), "prepared route table");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(errors))
        }
    }
}

impl core::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RouteTable")
            .field("group_versions", &self.inner.group_versions)
            .field("routes", &self.inner.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
