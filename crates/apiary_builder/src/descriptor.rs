//! Resource declarations.
//!
//! A resource type implements [`Resource`] plus whichever optional traits it
//! supports ([`HasStatus`], [`HasScale`], [`Defaulter`], [`Validator`],
//! [`MultiVersion`]). [`ResourceDescriptor::of`] erases the type into a
//! value the registry can store, opting into each supported trait:
//!
//! ```
//! use apiary_builder::descriptor::{Resource, ResourceDescriptor, Validator};
//! use apiary_runtime::{GroupVersionResource, ObjectMeta, TypedObject};
//! use apiary_storage::FieldError;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Fischer {
//!     #[serde(default)]
//!     metadata: ObjectMeta,
//!     #[serde(default)]
//!     disallowed_flunders: Vec<String>,
//! }
//!
//! impl TypedObject for Fischer {
//!     const KIND: &'static str = "Fischer";
//!     fn object_meta(&self) -> &ObjectMeta { &self.metadata }
//!     fn object_meta_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
//! }
//!
//! impl Resource for Fischer {
//!     fn group_version_resource() -> GroupVersionResource {
//!         GroupVersionResource::new("wardle.example.com", "v1alpha1", "fischers")
//!     }
//!     fn namespace_scoped() -> bool { false }
//! }
//!
//! impl Validator for Fischer {
//!     fn validate(&self) -> Vec<FieldError> { Vec::new() }
//! }
//!
//! let descriptor = ResourceDescriptor::of::<Fischer>().with_validator().build();
//! assert_eq!(descriptor.list_kind(), "FischerList");
//! assert!(!descriptor.namespace_scoped());
//! ```

use crate::provider::StorageProvider;
use crate::scale::ScaleFns;
use apiary_runtime::{
    GroupVersion, GroupVersionKind, GroupVersionResource, Object, Scale, Scheme, SchemeError,
    TypedObject,
};
use apiary_storage::FieldError;
use apiary_storage::rest::{NewObjectFn, Storage};
use apiary_storage::strategy::{CopyStatusFn, DefaultStrategy, Strategy, ValidateFn, ValidateUpdateFn};
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

/// Registers a descriptor's types, conversions and defaulters.
type InstallFn = Arc<dyn Fn(&mut Scheme) -> Result<(), SchemeError> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Resource traits
// ─────────────────────────────────────────────────────────────────────────────

/// A type served as a resource.
pub trait Resource: TypedObject {
    /// Where the type is served, e.g. `wardle.example.com/v1alpha1, Resource=flunders`.
    fn group_version_resource() -> GroupVersionResource;

    /// Whether objects live in namespaces.
    fn namespace_scoped() -> bool {
        true
    }

    /// Whether this is the version objects are persisted as.
    ///
    /// Every other version of the resource must implement [`MultiVersion`].
    fn is_storage_version() -> bool {
        true
    }

    /// Kind of list results.
    fn list_kind() -> String {
        format!("{}List", Self::KIND)
    }
}

/// A resource with a `status` subresource.
pub trait HasStatus: Resource {
    /// Copies the status of `self` onto `target`.
    fn copy_status_to(&self, target: &mut Self);
}

/// A resource with a `scale` subresource.
pub trait HasScale: Resource {
    /// Extracts the scale view.
    fn scale(&self) -> Scale;

    /// Writes the desired state of `scale` back into the resource.
    fn set_scale(&mut self, scale: &Scale);
}

/// Fills in unset fields of a decoded object.
pub trait Defaulter {
    /// Applies defaults in place.
    fn set_defaults(&mut self);
}

/// Validates objects before they are persisted.
pub trait Validator {
    /// Validates a new object.
    fn validate(&self) -> Vec<FieldError>;

    /// Validates an update against the stored object.
    fn validate_update(&self, _old: &Self) -> Vec<FieldError> {
        self.validate()
    }
}

/// A non-storage version of a resource whose storage version is `S`.
pub trait MultiVersion<S: Resource>: Resource {
    /// Converts to the storage version.
    ///
    /// # Errors
    ///
    /// Returns a message if the object has no storage representation.
    fn convert_to_storage(&self) -> Result<S, String>;

    /// Converts from the storage version.
    ///
    /// # Errors
    ///
    /// Returns a message if the stored object has no representation in this version.
    fn convert_from_storage(storage: &S) -> Result<Self, String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Type of the objects a resource persists.
#[derive(Clone)]
pub(crate) struct StorageType {
    pub(crate) kind: GroupVersionKind,
    pub(crate) new_fn: NewObjectFn,
    pub(crate) list_kind: String,
}

/// A type-erased resource declaration.
#[derive(Clone)]
pub struct ResourceDescriptor {
    gvr: GroupVersionResource,
    kind: &'static str,
    namespaced: bool,
    storage_version: bool,
    list_kind: String,
    new_fn: NewObjectFn,
    storage: Option<StorageType>,
    installs: Vec<InstallFn>,
    validate: Option<ValidateFn>,
    validate_update: Option<ValidateUpdateFn>,
    status: Option<CopyStatusFn>,
    scale: Option<ScaleFns>,
    subresources: Vec<ArbitrarySubResource>,
}

impl ResourceDescriptor {
    /// Starts a descriptor for `T`.
    #[must_use]
    pub fn of<T: Resource>() -> DescriptorBuilder<T> {
        let gvr = T::group_version_resource();
        let storage = T::is_storage_version().then(|| StorageType {
            kind: gvr.group_version().internal().with_kind(T::KIND),
            new_fn: new_fn::<T>(),
            list_kind: T::list_kind(),
        });
        let descriptor = Self {
            kind: T::KIND,
            namespaced: T::namespace_scoped(),
            storage_version: T::is_storage_version(),
            list_kind: T::list_kind(),
            new_fn: new_fn::<T>(),
            storage,
            installs: vec![Arc::new(install_kind::<T>) as InstallFn],
            validate: None,
            validate_update: None,
            status: None,
            scale: None,
            subresources: Vec::new(),
            gvr,
        };
        DescriptorBuilder {
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Where the resource is served.
    #[must_use]
    pub fn group_version_resource(&self) -> &GroupVersionResource {
        &self.gvr
    }

    /// Kind of the served objects.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Group, version and kind of the served objects.
    #[must_use]
    pub fn group_version_kind(&self) -> GroupVersionKind {
        self.gvr.group_version().with_kind(self.kind)
    }

    /// Whether objects live in namespaces.
    #[must_use]
    pub fn namespace_scoped(&self) -> bool {
        self.namespaced
    }

    /// Whether this is the version objects are persisted as.
    #[must_use]
    pub fn is_storage_version(&self) -> bool {
        self.storage_version
    }

    /// Kind of list results.
    #[must_use]
    pub fn list_kind(&self) -> &str {
        &self.list_kind
    }

    /// Kind objects are persisted as, or `None` for a non-storage version
    /// without a conversion.
    #[must_use]
    pub fn storage_kind(&self) -> Option<&GroupVersionKind> {
        self.storage.as_ref().map(|storage| &storage.kind)
    }

    /// Creates an empty object of the served kind.
    #[must_use]
    pub fn new_object(&self) -> Box<dyn Object> {
        (self.new_fn)()
    }

    /// Whether the resource declares a `status` subresource.
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    /// Whether the resource declares a `scale` subresource.
    #[must_use]
    pub fn has_scale(&self) -> bool {
        self.scale.is_some()
    }

    /// Declared arbitrary subresources.
    #[must_use]
    pub fn subresources(&self) -> &[ArbitrarySubResource] {
        &self.subresources
    }

    /// Strategy of the default store, carrying the declared validation.
    #[must_use]
    pub fn default_strategy(&self) -> Arc<dyn Strategy> {
        let mut strategy = DefaultStrategy::new(self.namespaced);
        if let Some(validate) = &self.validate {
            strategy = strategy.with_validation(validate.clone());
        }
        if let Some(validate) = &self.validate_update {
            strategy = strategy.with_update_validation(validate.clone());
        }
        Arc::new(strategy)
    }

    /// Registers the declared types, conversions and defaulters.
    ///
    /// # Errors
    ///
    /// Returns the first registration the scheme refuses.
    pub fn install(&self, scheme: &mut Scheme) -> Result<(), SchemeError> {
        self.installs.iter().try_for_each(|install| install(scheme))
    }

    pub(crate) fn storage_type(&self) -> Option<&StorageType> {
        self.storage.as_ref()
    }

    pub(crate) fn copy_status_fn(&self) -> Option<&CopyStatusFn> {
        self.status.as_ref()
    }

    pub(crate) fn scale_fns(&self) -> Option<&ScaleFns> {
        self.scale.as_ref()
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("gvr", &self.gvr)
            .field("kind", &self.kind)
            .field("namespaced", &self.namespaced)
            .field("storage_version", &self.storage_version)
            .field("status", &self.has_status())
            .field("scale", &self.has_scale())
            .field("subresources", &self.subresources)
            .finish_non_exhaustive()
    }
}

fn new_fn<T: TypedObject>() -> NewObjectFn {
    Arc::new(|| Box::new(T::default()) as Box<dyn Object>)
}

fn install_kind<T: Resource>(scheme: &mut Scheme) -> Result<(), SchemeError> {
    let gv = T::group_version_resource().group_version();
    scheme.add_known_type::<T>(&gv)?;
    if T::is_storage_version() {
        scheme.add_known_type::<T>(&gv.internal())?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// DescriptorBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Opts a descriptor into the optional traits of `T`.
pub struct DescriptorBuilder<T> {
    descriptor: ResourceDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> DescriptorBuilder<T> {
    /// Serves the type under `version` instead of its declared one.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        let gvr = &mut self.descriptor.gvr;
        gvr.version = version.clone();
        let gv = gvr.group_version();
        self.descriptor.installs.push(Arc::new(move |scheme: &mut Scheme| {
            scheme.add_known_type::<T>(&gv)
        }));
        self
    }

    /// Declares the `status` subresource.
    #[must_use]
    pub fn with_status(mut self) -> Self
    where
        T: HasStatus,
    {
        self.descriptor.status = Some(Arc::new(|from: &dyn Object, to: &mut dyn Object| {
            if let (Some(from), Some(to)) = (from.downcast_ref::<T>(), to.downcast_mut::<T>()) {
                from.copy_status_to(to);
            }
        }));
        self
    }

    /// Declares the `scale` subresource.
    #[must_use]
    pub fn with_scale(mut self) -> Self
    where
        T: HasScale,
    {
        self.descriptor.scale = Some(ScaleFns::of::<T>());
        self.descriptor.installs.push(Arc::new(|scheme: &mut Scheme| {
            scheme.add_known_type::<Scale>(&Scale::group_version())
        }));
        self
    }

    /// Registers [`Defaulter::set_defaults`] with the scheme.
    #[must_use]
    pub fn with_defaulter(mut self) -> Self
    where
        T: Defaulter,
    {
        self.descriptor.installs.push(Arc::new(|scheme: &mut Scheme| {
            scheme.add_defaulter::<T, _>(<T as Defaulter>::set_defaults);
            Ok(())
        }));
        self
    }

    /// Validates creates and updates of the default store with [`Validator`].
    #[must_use]
    pub fn with_validator(mut self) -> Self
    where
        T: Validator,
    {
        self.descriptor.validate = Some(Arc::new(|obj: &dyn Object| {
            obj.downcast_ref::<T>()
                .map(T::validate)
                .unwrap_or_default()
        }));
        self.descriptor.validate_update = Some(Arc::new(|obj: &dyn Object, old: &dyn Object| {
            match (obj.downcast_ref::<T>(), old.downcast_ref::<T>()) {
                (Some(obj), Some(old)) => obj.validate_update(old),
                _ => Vec::new(),
            }
        }));
        self
    }

    /// Declares the conversion of a non-storage version to its storage version `S`.
    #[must_use]
    pub fn with_conversion<S>(mut self) -> Self
    where
        S: Resource,
        T: MultiVersion<S>,
    {
        let gv = self.descriptor.gvr.group_version();
        self.descriptor.storage = Some(StorageType {
            kind: gv.internal().with_kind(S::KIND),
            new_fn: new_fn::<S>(),
            list_kind: S::list_kind(),
        });
        self.descriptor.installs.push(Arc::new(move |scheme: &mut Scheme| {
            scheme.add_known_type::<S>(&gv.internal())?;
            scheme.add_conversion::<T, S, _>(<T as MultiVersion<S>>::convert_to_storage);
            scheme.add_conversion::<S, T, _>(<T as MultiVersion<S>>::convert_from_storage);
            Ok(())
        }));
        self
    }

    /// Declares an arbitrary subresource.
    #[must_use]
    pub fn with_subresource(mut self, subresource: ArbitrarySubResource) -> Self {
        self.descriptor.subresources.push(subresource);
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> ResourceDescriptor {
        self.descriptor
    }
}

impl<T: Resource> From<DescriptorBuilder<T>> for ResourceDescriptor {
    fn from(builder: DescriptorBuilder<T>) -> Self {
        builder.build()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ArbitrarySubResource
// ─────────────────────────────────────────────────────────────────────────────

type InstallAtFn = Arc<dyn Fn(&mut Scheme, &GroupVersion) -> Result<(), SchemeError> + Send + Sync>;

/// Where a subresource's own storage comes from.
#[derive(Clone)]
pub enum SubResourceSource {
    /// An already constructed handle.
    Handler(Arc<dyn Storage>),
    /// A provider run on first use.
    Provider(StorageProvider),
}

/// A subresource with its own handler, e.g. `flunders/logs`.
#[derive(Clone)]
pub struct ArbitrarySubResource {
    path: String,
    request_kind: Option<&'static str>,
    install: Option<InstallAtFn>,
    source: SubResourceSource,
}

impl ArbitrarySubResource {
    /// Declares `path` served by `handler`, accepting requests of kind `R`.
    #[must_use]
    pub fn new<R: TypedObject>(path: impl Into<String>, handler: Arc<dyn Storage>) -> Self {
        Self::from_source::<R>(path, SubResourceSource::Handler(handler))
    }

    /// Declares `path` served by the handle `provider` builds on first use.
    #[must_use]
    pub fn with_provider<R: TypedObject>(path: impl Into<String>, provider: StorageProvider) -> Self {
        Self::from_source::<R>(path, SubResourceSource::Provider(provider))
    }

    /// Declares `path` served by `handler`, accepting requests shaped like
    /// the parent resource.
    #[must_use]
    pub fn parent_shaped(path: impl Into<String>, handler: Arc<dyn Storage>) -> Self {
        Self {
            path: path.into(),
            request_kind: None,
            install: None,
            source: SubResourceSource::Handler(handler),
        }
    }

    fn from_source<R: TypedObject>(path: impl Into<String>, source: SubResourceSource) -> Self {
        Self {
            path: path.into(),
            request_kind: Some(R::KIND),
            install: Some(Arc::new(|scheme: &mut Scheme, gv: &GroupVersion| {
                scheme.add_known_type::<R>(gv)
            })),
            source,
        }
    }

    /// The subresource path below the parent, e.g. `logs`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of request bodies, or `None` when shaped like the parent.
    #[must_use]
    pub fn request_kind(&self) -> Option<&'static str> {
        self.request_kind
    }

    /// The subresource's own storage.
    #[must_use]
    pub fn source(&self) -> &SubResourceSource {
        &self.source
    }

    /// Registers the request kind under the parent's group version.
    pub(crate) fn install(&self, scheme: &mut Scheme, gv: &GroupVersion) -> Result<(), SchemeError> {
        self.install.as_ref().map_or(Ok(()), |install| install(scheme, gv))
    }
}

impl fmt::Debug for ArbitrarySubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArbitrarySubResource")
            .field("path", &self.path)
            .field("request_kind", &self.request_kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_runtime::ObjectMeta;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Flunder {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        reference: String,
        #[serde(default)]
        phase: String,
    }

    impl TypedObject for Flunder {
        const KIND: &'static str = "Flunder";
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    impl Resource for Flunder {
        fn group_version_resource() -> GroupVersionResource {
            GroupVersionResource::new("wardle.example.com", "v1alpha1", "flunders")
        }
    }

    impl HasStatus for Flunder {
        fn copy_status_to(&self, target: &mut Self) {
            target.phase = self.phase.clone();
        }
    }

    impl Defaulter for Flunder {
        fn set_defaults(&mut self) {
            if self.phase.is_empty() {
                self.phase = "Pending".into();
            }
        }
    }

    impl Validator for Flunder {
        fn validate(&self) -> Vec<FieldError> {
            if self.reference.is_empty() {
                vec![FieldError::new("reference", "must be set")]
            } else {
                Vec::new()
            }
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct FlunderV2 {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        target: String,
    }

    impl TypedObject for FlunderV2 {
        const KIND: &'static str = "Flunder";
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    impl Resource for FlunderV2 {
        fn group_version_resource() -> GroupVersionResource {
            GroupVersionResource::new("wardle.example.com", "v1beta1", "flunders")
        }
        fn is_storage_version() -> bool {
            false
        }
    }

    impl MultiVersion<Flunder> for FlunderV2 {
        fn convert_to_storage(&self) -> Result<Flunder, String> {
            Ok(Flunder {
                metadata: self.metadata.clone(),
                reference: self.target.clone(),
                phase: String::new(),
            })
        }

        fn convert_from_storage(storage: &Flunder) -> Result<Self, String> {
            Ok(Self {
                metadata: storage.metadata.clone(),
                target: storage.reference.clone(),
            })
        }
    }

    #[test]
    fn storage_version_installs_internal_kind() {
        let descriptor = ResourceDescriptor::of::<Flunder>()
            .with_status()
            .with_defaulter()
            .build();
        let mut scheme = Scheme::new();
        descriptor.install(&mut scheme).unwrap();

        let gv = GroupVersion::new("wardle.example.com", "v1alpha1");
        assert!(scheme.recognizes(&gv.with_kind("Flunder")));
        assert!(scheme.recognizes(&gv.internal().with_kind("Flunder")));
        assert_eq!(descriptor.storage_kind(), Some(&gv.internal().with_kind("Flunder")));
        assert!(descriptor.has_status());
        assert!(!descriptor.has_scale());

        let mut obj = descriptor.new_object();
        scheme.apply_defaults(obj.as_mut());
        assert_eq!(obj.downcast_ref::<Flunder>().unwrap().phase, "Pending");
    }

    #[test]
    fn non_storage_version_needs_conversion() {
        let bare = ResourceDescriptor::of::<FlunderV2>().build();
        assert!(bare.storage_kind().is_none());

        let converted = ResourceDescriptor::of::<FlunderV2>()
            .with_conversion::<Flunder>()
            .build();
        let mut scheme = Scheme::new();
        converted.install(&mut scheme).unwrap();
        assert!(scheme.converts::<FlunderV2, Flunder>());
        assert!(scheme.converts::<Flunder, FlunderV2>());
        assert_eq!(
            converted.storage_kind().unwrap().version,
            apiary_runtime::INTERNAL_VERSION
        );
    }

    #[test]
    fn validator_runs_through_default_strategy() {
        let descriptor = ResourceDescriptor::of::<Flunder>().with_validator().build();
        let strategy = descriptor.default_strategy();
        let ctx = apiary_storage::context::RequestContext::new();

        let errors = strategy.validate(&ctx, &Flunder::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "reference");
        assert!(strategy.namespace_scoped());
    }

    #[test]
    fn status_copy_is_type_checked() {
        let descriptor = ResourceDescriptor::of::<Flunder>().with_status().build();
        let copy = descriptor.copy_status_fn().unwrap();

        let from = Flunder {
            phase: "Ready".into(),
            ..Flunder::default()
        };
        let mut to = Flunder {
            reference: "kept".into(),
            ..Flunder::default()
        };
        copy(&from, &mut to);
        assert_eq!(to.phase, "Ready");
        assert_eq!(to.reference, "kept");

        let mut other = FlunderV2::default();
        copy(&from, &mut other);
        assert!(other.target.is_empty());
    }
}
