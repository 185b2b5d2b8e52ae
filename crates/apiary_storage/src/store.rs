//! The generic persistence-backed store.
//!
//! [`Store`] implements every storage capability over a [`Backend`], leaving
//! resource-specific behavior to [`Strategy`] hooks.

use crate::backend::{Backend, Versioned};
use crate::config::RestOptionsGetter;
use crate::context::RequestContext;
use crate::error::{ApiError, BackendError, FieldError, StorageError};
use crate::request::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions, UpdatedObjectInfo,
};
use crate::rest::{
    Creater, Deleter, Getter, Lister, NewObjectFn, StandardStorage, Storage, Updater,
    ValidateObjectFn, ValidateObjectUpdateFn,
};
use crate::strategy::Strategy;
use apiary_runtime::{GroupResource, Object, ObjectList, Scheme};
use async_trait::async_trait;
use core::fmt;
use serde_json::Value;
use std::sync::Arc;

/// Customizes a store before it is completed.
pub type StoreFn = Arc<dyn Fn(&Scheme, &mut Store) -> Result<(), StorageError> + Send + Sync>;

/// Attempts of an unconditional update racing other writers.
const MAX_UNCONDITIONAL_RETRIES: usize = 8;

/// Persistence-backed storage for one resource.
///
/// Cloning a store shares its backend, which is how subresource handles such
/// as `status` write to the same objects with a different strategy.
#[derive(Clone)]
pub struct Store {
    /// Creates an empty object of the stored kind.
    pub new_fn: NewObjectFn,
    /// Kind of list results, e.g. `FlunderList`.
    pub list_kind: String,
    /// Resource used in keys and error messages.
    pub qualified_resource: GroupResource,
    /// Strategy of create calls.
    pub create_strategy: Arc<dyn Strategy>,
    /// Strategy of update calls.
    pub update_strategy: Arc<dyn Strategy>,
    /// Strategy of delete calls.
    pub delete_strategy: Arc<dyn Strategy>,
    backend: Option<Arc<dyn Backend>>,
    key_prefix: String,
}

impl Store {
    /// Creates a store using `strategy` for every operation.
    ///
    /// The store has no backend until [`complete_with_options`](Self::complete_with_options)
    /// or [`set_backend`](Self::set_backend) is called.
    #[must_use]
    pub fn new(
        qualified_resource: GroupResource,
        new_fn: NewObjectFn,
        list_kind: impl Into<String>,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        Self {
            new_fn,
            list_kind: list_kind.into(),
            qualified_resource,
            create_strategy: strategy.clone(),
            update_strategy: strategy.clone(),
            delete_strategy: strategy,
            backend: None,
            key_prefix: String::new(),
        }
    }

    /// Replaces the update strategy.
    #[must_use]
    pub fn with_update_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.update_strategy = strategy;
        self
    }

    /// Sets the backend and key prefix directly.
    pub fn set_backend(&mut self, backend: Arc<dyn Backend>, key_prefix: impl Into<String>) {
        self.backend = Some(backend);
        self.key_prefix = key_prefix.into();
    }

    /// Returns `true` once the store has a backend.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether objects live in namespaces.
    #[must_use]
    pub fn namespace_scoped(&self) -> bool {
        self.create_strategy.namespace_scoped()
    }

    /// Resolves the backend from `options`, unless one is already set.
    ///
    /// # Errors
    ///
    /// Returns the options source's error.
    pub fn complete_with_options(&mut self, options: &dyn RestOptionsGetter) -> Result<(), StorageError> {
        if self.backend.is_some() {
            return Ok(());
        }
        let rest = options.rest_options(&self.qualified_resource)?;
        tracing::debug!(
            resource = %self.qualified_resource,
            prefix = %rest.resource_prefix,
            "completed store"
        );
        self.set_backend(rest.backend, rest.resource_prefix);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys and encoding
    // ─────────────────────────────────────────────────────────────────────────

    fn backend(&self) -> Result<&Arc<dyn Backend>, ApiError> {
        self.backend.as_ref().ok_or_else(|| {
            ApiError::Internal(format!("store for {} has no backend", self.qualified_resource))
        })
    }

    /// The request namespace, which becomes a key segment.
    fn namespace<'a>(&self, ctx: &'a RequestContext) -> Result<Option<&'a str>, ApiError> {
        match ctx.namespace() {
            Some(namespace) => match invalid_name(namespace) {
                Some(message) => Err(ApiError::BadRequest(format!(
                    "invalid namespace {namespace:?}: {message}"
                ))),
                None => Ok(Some(namespace)),
            },
            None => Ok(None),
        }
    }

    fn require_namespace<'a>(&self, ctx: &'a RequestContext) -> Result<&'a str, ApiError> {
        self.namespace(ctx)?.ok_or_else(|| {
            ApiError::BadRequest(format!(
                "namespace is required for {}",
                self.qualified_resource
            ))
        })
    }

    fn key_for(&self, ctx: &RequestContext, name: &str) -> Result<String, ApiError> {
        if let Some(message) = invalid_name(name) {
            return Err(ApiError::BadRequest(format!("invalid name {name:?}: {message}")));
        }
        if !self.namespace_scoped() {
            return Ok(format!("{}/{name}", self.key_prefix));
        }
        let namespace = self.require_namespace(ctx)?;
        Ok(format!("{}/{namespace}/{name}", self.key_prefix))
    }

    fn list_prefix(&self, ctx: &RequestContext) -> Result<String, ApiError> {
        if !self.namespace_scoped() {
            return Ok(format!("{}/", self.key_prefix));
        }
        Ok(match self.namespace(ctx)? {
            Some(namespace) => format!("{}/{namespace}/", self.key_prefix),
            None => format!("{}/", self.key_prefix),
        })
    }

    fn decode(&self, stored: Versioned) -> Result<Box<dyn Object>, ApiError> {
        let mut obj = (self.new_fn)();
        obj.load_value(stored.value).map_err(|e| {
            ApiError::Internal(format!("decoding stored {}: {e}", self.qualified_resource))
        })?;
        obj.meta_mut().resource_version = stored.version.to_string();
        Ok(obj)
    }

    fn encode(&self, obj: &dyn Object) -> Result<Value, ApiError> {
        let mut value = obj
            .to_value()
            .map_err(|e| ApiError::Internal(format!("encoding {}: {e}", obj.kind())))?;
        if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("resourceVersion");
        }
        Ok(value)
    }

    fn backend_error(&self, name: &str, err: BackendError) -> ApiError {
        match err {
            BackendError::NotFound(_) => ApiError::not_found(&self.qualified_resource, name),
            BackendError::AlreadyExists(_) => {
                ApiError::already_exists(&self.qualified_resource, name)
            }
            BackendError::VersionConflict { .. } => ApiError::conflict(
                &self.qualified_resource,
                name,
                "the object has been modified; please apply your changes to the latest version and try again",
            ),
            err @ (BackendError::Io(_) | BackendError::Serialization(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn check_namespace(&self, ctx: &RequestContext, obj: &mut dyn Object) -> Result<(), ApiError> {
        let meta = obj.meta_mut();
        if !self.namespace_scoped() {
            meta.namespace.clear();
            return Ok(());
        }
        let namespace = self.require_namespace(ctx)?;
        if meta.namespace.is_empty() {
            meta.namespace = namespace.to_string();
        } else if meta.namespace != namespace {
            return Err(ApiError::BadRequest(
                "the namespace of the object does not match the namespace on the request".into(),
            ));
        }
        Ok(())
    }

    fn create_object(
        &self,
        ctx: &RequestContext,
        mut obj: Box<dyn Object>,
        create_validation: Option<&ValidateObjectFn>,
        dry_run: bool,
    ) -> Result<Box<dyn Object>, ApiError> {
        self.check_namespace(ctx, obj.as_mut())?;
        let name = obj.meta().name.clone();
        if name.is_empty() {
            return Err(ApiError::invalid(
                obj.kind(),
                "",
                vec![FieldError::new("metadata.name", "name is required")],
            ));
        }
        let key = self.key_for(ctx, &name)?;

        let meta = obj.meta_mut();
        meta.uid = nanoid::nanoid!();
        meta.resource_version.clear();

        let strategy = &self.create_strategy;
        strategy.prepare_for_create(ctx, obj.as_mut());
        let errors = strategy.validate(ctx, obj.as_ref());
        if !errors.is_empty() {
            return Err(ApiError::invalid(obj.kind(), &name, errors));
        }
        strategy.canonicalize(obj.as_mut());
        if let Some(validate) = create_validation {
            validate(ctx, obj.as_ref())?;
        }
        if dry_run {
            return Ok(obj);
        }

        let version = self
            .backend()?
            .create(&key, self.encode(obj.as_ref())?)
            .map_err(|e| self.backend_error(&name, e))?;
        obj.meta_mut().resource_version = version.to_string();
        tracing::debug!(resource = %self.qualified_resource, name = %name, version, "created object");
        Ok(obj)
    }

    /// Applies one update attempt against `stored`.
    ///
    /// Returns the written object, or `None` if an unconditional write lost
    /// a race and should be retried.
    fn update_object(
        &self,
        ctx: &RequestContext,
        name: &str,
        key: &str,
        stored: Versioned,
        obj_info: &dyn UpdatedObjectInfo,
        update_validation: Option<&ValidateObjectUpdateFn>,
        dry_run: bool,
    ) -> Result<Option<Box<dyn Object>>, ApiError> {
        let stored_version = stored.version;
        let old = self.decode(stored)?;
        if let Some(preconditions) = obj_info.preconditions() {
            preconditions.check(&self.qualified_resource, old.as_ref())?;
        }

        let mut obj = obj_info.updated_object(ctx, old.as_ref())?;
        let strategy = &self.update_strategy;
        let unconditional = obj.meta().resource_version.is_empty();
        if unconditional {
            if !strategy.allow_unconditional_update() {
                return Err(ApiError::invalid(
                    obj.kind(),
                    name,
                    vec![FieldError::new(
                        "metadata.resourceVersion",
                        "must be specified for an update",
                    )],
                ));
            }
        } else if obj.meta().resource_version != old.meta().resource_version {
            return Err(self.backend_error(
                name,
                BackendError::VersionConflict {
                    key: key.to_string(),
                    expected: obj.meta().resource_version.parse().unwrap_or_default(),
                    actual: stored_version,
                },
            ));
        }

        {
            let meta = obj.meta_mut();
            if meta.name.is_empty() {
                meta.name = name.to_string();
            } else if meta.name != name {
                return Err(ApiError::BadRequest(format!(
                    "the name of the object ({}) does not match the name on the URL ({name})",
                    meta.name
                )));
            }
            let old_meta = old.meta();
            if meta.namespace.is_empty() {
                meta.namespace.clone_from(&old_meta.namespace);
            } else if meta.namespace != old_meta.namespace {
                return Err(ApiError::BadRequest(
                    "the namespace of the object does not match the namespace on the request"
                        .into(),
                ));
            }
            meta.uid.clone_from(&old_meta.uid);
        }

        strategy.prepare_for_update(ctx, &mut obj, old.as_ref())?;
        let errors = strategy.validate_update(ctx, obj.as_ref(), old.as_ref());
        if !errors.is_empty() {
            return Err(ApiError::invalid(obj.kind(), name, errors));
        }
        strategy.canonicalize(obj.as_mut());
        if let Some(validate) = update_validation {
            validate(ctx, obj.as_ref(), old.as_ref())?;
        }
        if dry_run {
            obj.meta_mut().resource_version = stored_version.to_string();
            return Ok(Some(obj));
        }

        match self
            .backend()?
            .update(key, self.encode(obj.as_ref())?, stored_version)
        {
            Ok(version) => {
                obj.meta_mut().resource_version = version.to_string();
                tracing::debug!(resource = %self.qualified_resource, name, version, "updated object");
                Ok(Some(obj))
            }
            Err(BackendError::VersionConflict { .. } | BackendError::NotFound(_))
                if unconditional =>
            {
                Ok(None)
            }
            Err(e) => Err(self.backend_error(name, e)),
        }
    }
}

/// Returns why `name` cannot be used as a key segment, if it cannot.
fn invalid_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("name is required")
    } else if name == "." || name == ".." {
        Some("may not be '.' or '..'")
    } else if name.contains('/') || name.contains('%') {
        Some("may not contain '/' or '%'")
    } else {
        None
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("qualified_resource", &self.qualified_resource)
            .field("list_kind", &self.list_kind)
            .field("key_prefix", &self.key_prefix)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage capabilities
// ─────────────────────────────────────────────────────────────────────────────

impl Storage for Store {
    fn new_object(&self) -> Box<dyn Object> {
        (self.new_fn)()
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }

    fn as_lister(self: Arc<Self>) -> Option<Arc<dyn Lister>> {
        Some(self)
    }

    fn as_creater(self: Arc<Self>) -> Option<Arc<dyn Creater>> {
        Some(self)
    }

    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        Some(self)
    }

    fn as_deleter(self: Arc<Self>) -> Option<Arc<dyn Deleter>> {
        Some(self)
    }

    fn as_standard(self: Arc<Self>) -> Option<Arc<dyn StandardStorage>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for Store {
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        _options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        ctx.ensure_active()?;
        let key = self.key_for(ctx, name)?;
        let stored = self
            .backend()?
            .get(&key)
            .map_err(|e| self.backend_error(name, e))?;
        self.decode(stored)
    }
}

#[async_trait]
impl Lister for Store {
    fn new_list(&self) -> ObjectList {
        ObjectList::new(self.list_kind.clone())
    }

    async fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<ObjectList, ApiError> {
        ctx.ensure_active()?;
        let (entries, revision) = self
            .backend()?
            .list(&self.list_prefix(ctx)?)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let mut list = self.new_list();
        list.resource_version = revision.to_string();
        for (_, stored) in entries {
            let obj = self.decode(stored)?;
            if options.matches(obj.meta()) {
                list.items.push(obj);
            }
        }
        Ok(list)
    }
}

#[async_trait]
impl Creater for Store {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Box<dyn Object>,
        create_validation: Option<ValidateObjectFn>,
        options: &CreateOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        ctx.ensure_active()?;
        self.create_object(ctx, obj, create_validation.as_ref(), options.dry_run)
    }
}

#[async_trait]
impl Updater for Store {
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo,
        create_validation: Option<ValidateObjectFn>,
        update_validation: Option<ValidateObjectUpdateFn>,
        options: &UpdateOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError> {
        let key = self.key_for(ctx, name)?;
        for _ in 0..MAX_UNCONDITIONAL_RETRIES {
            ctx.ensure_active()?;
            let stored = match self.backend()?.get(&key) {
                Ok(stored) => stored,
                Err(BackendError::NotFound(_)) => {
                    let allowed = self.update_strategy.allow_create_on_update()
                        || options.force_allow_create;
                    if !allowed {
                        return Err(ApiError::not_found(&self.qualified_resource, name));
                    }
                    let mut obj = obj_info.updated_object(ctx, (self.new_fn)().as_ref())?;
                    if obj.meta().name.is_empty() {
                        obj.meta_mut().name = name.to_string();
                    }
                    let created = self.create_object(
                        ctx,
                        obj,
                        create_validation.as_ref(),
                        options.dry_run,
                    )?;
                    return Ok((created, true));
                }
                Err(e) => return Err(self.backend_error(name, e)),
            };

            if let Some(obj) = self.update_object(
                ctx,
                name,
                &key,
                stored,
                obj_info,
                update_validation.as_ref(),
                options.dry_run,
            )? {
                return Ok((obj, false));
            }
            tracing::debug!(resource = %self.qualified_resource, name, "retrying unconditional update");
        }
        Err(ApiError::conflict(
            &self.qualified_resource,
            name,
            "too many concurrent writers",
        ))
    }
}

#[async_trait]
impl Deleter for Store {
    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError> {
        ctx.ensure_active()?;
        let key = self.key_for(ctx, name)?;
        let backend = self.backend()?;
        let stored = backend.get(&key).map_err(|e| self.backend_error(name, e))?;
        let version = stored.version;
        let old = self.decode(stored)?;
        if let Some(preconditions) = &options.preconditions {
            preconditions.check(&self.qualified_resource, old.as_ref())?;
        }
        if options.dry_run {
            return Ok((old, true));
        }

        backend
            .delete(&key, Some(version))
            .map_err(|e| self.backend_error(name, e))?;
        tracing::debug!(resource = %self.qualified_resource, name, "deleted object");
        Ok((old, true))
    }
}
