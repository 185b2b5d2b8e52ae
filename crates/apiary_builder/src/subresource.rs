//! Subresource composition.
//!
//! A subresource route is served by one of five adapter shapes, picked from
//! the path and the subresource's declared capabilities:
//!
//! | Shape | Chosen when | Parent must support | Parent bound as |
//! |-------|-------------|---------------------|-----------------|
//! | [`Status`](AdapterKind::Status) | path is `status` | standard storage, generic store | - |
//! | [`Scale`](AdapterKind::Scale) | path is `scale` | get and update | read view |
//! | [`Connector`](AdapterKind::Connector) | subresource connects | get | read view |
//! | [`GetterUpdater`](AdapterKind::GetterUpdater) | subresource gets and updates | standard storage | full storage |
//! | [`Passthrough`](AdapterKind::Passthrough) | anything else | nothing beyond construction | not bound |
//!
//! The shape is decided once, at registration when the subresource handle
//! is already known, otherwise when the subresource provider first runs. A
//! parent lacking a required capability is a [`ConfigError`], never a
//! silent fallback to the passthrough shape.
//!
//! Every shape resolves the parent's storage before building anything, so a
//! parent that fails to construct fails all of its subresources with it.

use crate::error::{ConfigError, RegistryError};
use crate::provider::{SingletonProvider, StorageProvider};
use crate::scale::{ScaleFns, ScaleStorage};
use apiary_runtime::{GroupVersion, GroupVersionKind, GroupVersionResource, Object, Scheme};
use apiary_storage::ApiError;
use apiary_storage::config::RestOptionsGetter;
use apiary_storage::context::{ParentStorage, RequestContext};
use apiary_storage::request::{GetOptions, UpdateOptions, UpdatedObjectInfo};
use apiary_storage::rest::{
    Capability, ConnectHandler, Connecter, Getter, Storage, Updater,
    ValidateObjectFn, ValidateObjectUpdateFn,
};
use apiary_storage::store::Store;
use apiary_storage::strategy::{CopyStatusFn, StatusStrategy};
use async_trait::async_trait;
use core::fmt;
use std::sync::{Arc, OnceLock};

/// Reserved path of the status subresource.
pub const STATUS: &str = "status";

/// Reserved path of the scale subresource.
pub const SCALE: &str = "scale";

/// The adapter shape serving a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Parent store with a status-only update strategy.
    Status,
    /// Scale view over the parent.
    Scale,
    /// Connect handler with the parent bound.
    Connector,
    /// Getter and updater with the parent bound.
    GetterUpdater,
    /// The subresource's own handle, unmodified.
    Passthrough,
}

impl AdapterKind {
    /// Shape reserved for `path`, if any.
    #[must_use]
    pub fn for_path(path: &str) -> Option<Self> {
        match path {
            STATUS => Some(Self::Status),
            SCALE => Some(Self::Scale),
            _ => None,
        }
    }

    /// Shape of a non-reserved subresource, from what its handle implements.
    #[must_use]
    pub fn probe(subresource: &Arc<dyn Storage>) -> Self {
        if Capability::Connect.is_supported_by(subresource) {
            Self::Connector
        } else if supports_all(subresource, &[Capability::Get, Capability::Update]) {
            Self::GetterUpdater
        } else {
            Self::Passthrough
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composition
// ─────────────────────────────────────────────────────────────────────────────

/// What a subresource is built from.
#[derive(Clone)]
pub enum SubresourceShape {
    /// Status over the parent store, copying status with the given function.
    Status(CopyStatusFn),
    /// Scale over the parent, with the resource's scale accessors.
    Scale(ScaleFns),
    /// An already constructed subresource handle.
    Handler(Arc<dyn Storage>),
    /// A subresource provider, probed when it first runs.
    Provider(StorageProvider),
}

impl SubresourceShape {
    /// The adapter shape, if it is known before the subresource is built.
    #[must_use]
    pub fn kind(&self) -> Option<AdapterKind> {
        match self {
            Self::Status(_) => Some(AdapterKind::Status),
            Self::Scale(_) => Some(AdapterKind::Scale),
            Self::Handler(handler) => Some(AdapterKind::probe(handler)),
            Self::Provider(_) => None,
        }
    }
}

impl fmt::Debug for SubresourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(_) => f.write_str("Status"),
            Self::Scale(_) => f.write_str("Scale"),
            Self::Handler(handler) => f.debug_tuple("Handler").field(handler).finish(),
            Self::Provider(_) => f.write_str("Provider"),
        }
    }
}

/// Records the adapter shape a subresource resolved to.
pub type ResolvedAdapter = Arc<OnceLock<AdapterKind>>;

/// Builds the provider of subresource `resource` over `parent`.
///
/// The shape it resolves to is stored in `resolved`.
#[must_use]
pub fn compose(
    resource: GroupVersionResource,
    parent: SingletonProvider,
    shape: SubresourceShape,
    resolved: ResolvedAdapter,
) -> StorageProvider {
    Arc::new(move |scheme: &Scheme, options: &dyn RestOptionsGetter| {
        let parent = parent.get(scheme, options)?;
        let subresource = match &shape {
            SubresourceShape::Status(copy_status) => {
                record(&resource, &resolved, AdapterKind::Status);
                return status_adapter(&resource, parent, copy_status);
            }
            SubresourceShape::Scale(fns) => {
                record(&resource, &resolved, AdapterKind::Scale);
                return scale_adapter(&resource, parent, fns);
            }
            SubresourceShape::Handler(handler) => handler.clone(),
            SubresourceShape::Provider(provider) => provider(scheme, options)?,
        };
        let kind = AdapterKind::probe(&subresource);
        record(&resource, &resolved, kind);
        bind_parent(&resource, kind, parent, subresource)
    })
}

fn record(resource: &GroupVersionResource, resolved: &ResolvedAdapter, kind: AdapterKind) {
    resolved.get_or_init(|| kind);
    tracing::debug!(subresource = %resource, adapter = ?kind, "resolved subresource adapter");
}

fn missing(resource: &GroupVersionResource, capability: Capability) -> RegistryError {
    ConfigError::MissingParentCapability {
        resource: resource.clone(),
        capability,
    }
    .into()
}

fn status_adapter(
    resource: &GroupVersionResource,
    parent: Arc<dyn Storage>,
    copy_status: &CopyStatusFn,
) -> Result<Arc<dyn Storage>, RegistryError> {
    if parent.clone().as_standard().is_none() {
        return Err(missing(resource, Capability::Standard));
    }
    let store = parent.downcast_arc::<Store>().map_err(|_| ConfigError::ParentNotStore {
        resource: resource.clone(),
    })?;
    Ok(Arc::new(StatusStorage::new(&store, copy_status.clone())))
}

fn scale_adapter(
    resource: &GroupVersionResource,
    parent: Arc<dyn Storage>,
    fns: &ScaleFns,
) -> Result<Arc<dyn Storage>, RegistryError> {
    let getter = parent.clone().as_getter().ok_or_else(|| missing(resource, Capability::Get))?;
    let updater = parent.as_updater().ok_or_else(|| missing(resource, Capability::Update))?;
    Ok(Arc::new(ScaleStorage::new(
        resource.group_resource(),
        getter,
        updater,
        fns.clone(),
    )))
}

fn bind_parent(
    resource: &GroupVersionResource,
    kind: AdapterKind,
    parent: Arc<dyn Storage>,
    subresource: Arc<dyn Storage>,
) -> Result<Arc<dyn Storage>, RegistryError> {
    match kind {
        AdapterKind::Connector => {
            let getter = parent
                .as_getter()
                .ok_or_else(|| missing(resource, Capability::Get))?;
            let connecter = subresource
                .as_connecter()
                .ok_or_else(|| missing(resource, Capability::Connect))?;
            Ok(Arc::new(ConnecterAdapter {
                parent: ParentStorage::getter(getter),
                subresource: connecter,
            }))
        }
        AdapterKind::GetterUpdater => {
            let standard = parent
                .as_standard()
                .ok_or_else(|| missing(resource, Capability::Standard))?;
            let getter = subresource.clone().as_getter();
            let updater = subresource.clone().as_updater();
            let (Some(getter), Some(updater)) = (getter, updater) else {
                return Ok(subresource);
            };
            Ok(Arc::new(GetterUpdaterAdapter {
                parent: ParentStorage::standard(standard),
                subresource,
                getter,
                updater,
            }))
        }
        AdapterKind::Status | AdapterKind::Scale | AdapterKind::Passthrough => Ok(subresource),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// The status subresource: the parent store with a status-only update strategy.
///
/// Shares the parent's backend, so reads and writes hit the same objects.
#[derive(Debug)]
pub struct StatusStorage {
    store: Store,
}

impl StatusStorage {
    /// Copies `parent` and replaces its update strategy.
    #[must_use]
    pub fn new(parent: &Store, copy_status: CopyStatusFn) -> Self {
        let mut store = parent.clone();
        store.update_strategy = Arc::new(StatusStrategy::new(parent.update_strategy.clone(), copy_status));
        Self { store }
    }
}

impl Storage for StatusStorage {
    fn new_object(&self) -> Box<dyn Object> {
        self.store.new_object()
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }

    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for StatusStorage {
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        self.store.get(ctx, name, options).await
    }
}

#[async_trait]
impl Updater for StatusStorage {
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo,
        create_validation: Option<ValidateObjectFn>,
        update_validation: Option<ValidateObjectUpdateFn>,
        options: &UpdateOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError> {
        // Status writes never create the parent.
        let options = UpdateOptions {
            force_allow_create: false,
            ..options.clone()
        };
        self.store
            .update(ctx, name, obj_info, create_validation, update_validation, &options)
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// A connect subresource with the parent's read view bound into every call.
pub struct ConnecterAdapter {
    parent: ParentStorage,
    subresource: Arc<dyn Connecter>,
}

impl fmt::Debug for ConnecterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnecterAdapter")
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Storage for ConnecterAdapter {
    fn new_object(&self) -> Box<dyn Object> {
        self.subresource.new_object()
    }

    fn group_version_kind(&self, containing: &GroupVersion) -> Option<GroupVersionKind> {
        self.subresource.group_version_kind(containing)
    }

    fn as_connecter(self: Arc<Self>) -> Option<Arc<dyn Connecter>> {
        Some(self)
    }
}

#[async_trait]
impl Connecter for ConnecterAdapter {
    async fn connect(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: Box<dyn Object>,
    ) -> Result<Box<dyn ConnectHandler>, ApiError> {
        let ctx = ctx.with_parent(self.parent.clone());
        self.subresource.connect(&ctx, name, options).await
    }

    fn new_connect_options(&self) -> (Box<dyn Object>, bool, String) {
        self.subresource.new_connect_options()
    }

    fn connect_methods(&self) -> Vec<String> {
        self.subresource.connect_methods()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Getter/Updater
// ─────────────────────────────────────────────────────────────────────────────

/// A get/update subresource with the parent's full storage bound into every call.
pub struct GetterUpdaterAdapter {
    parent: ParentStorage,
    subresource: Arc<dyn Storage>,
    getter: Arc<dyn Getter>,
    updater: Arc<dyn Updater>,
}

impl fmt::Debug for GetterUpdaterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterUpdaterAdapter")
            .field("parent", &self.parent)
            .field("subresource", &self.subresource)
            .finish_non_exhaustive()
    }
}

impl Storage for GetterUpdaterAdapter {
    fn new_object(&self) -> Box<dyn Object> {
        self.subresource.new_object()
    }

    fn group_version_kind(&self, containing: &GroupVersion) -> Option<GroupVersionKind> {
        self.subresource.group_version_kind(containing)
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }

    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for GetterUpdaterAdapter {
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        let ctx = ctx.with_parent(self.parent.clone());
        self.getter.get(&ctx, name, options).await
    }
}

#[async_trait]
impl Updater for GetterUpdaterAdapter {
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo,
        create_validation: Option<ValidateObjectFn>,
        update_validation: Option<ValidateObjectUpdateFn>,
        options: &UpdateOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError> {
        let ctx = ctx.with_parent(self.parent.clone());
        self.updater
            .update(&ctx, name, obj_info, create_validation, update_validation, options)
            .await
    }
}

/// Returns `true` if `storage` implements every capability in `required`.
#[must_use]
pub fn supports_all(storage: &Arc<dyn Storage>, required: &[Capability]) -> bool {
    required.iter().all(|capability| capability.is_supported_by(storage))
}
