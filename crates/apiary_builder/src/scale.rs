//! The `scale` subresource.
//!
//! [`ScaleStorage`] exposes any resource declaring [`HasScale`] as an
//! `autoscaling/v1` [`Scale`]. The parent object stays the source of truth:
//! reads extract the scale view, writes inject the new scale into a copy of
//! the stored parent and update the parent as a whole, so the parent's own
//! concurrency control decides conflicts.

use crate::descriptor::HasScale;
use apiary_runtime::{GroupResource, GroupVersion, GroupVersionKind, Object, Scale, TypedObject};
use apiary_storage::ApiError;
use apiary_storage::context::{ParentStorage, RequestContext};
use apiary_storage::request::{GetOptions, Preconditions, UpdateOptions, UpdatedObjectInfo};
use apiary_storage::rest::{Getter, Storage, Updater, ValidateObjectFn, ValidateObjectUpdateFn};
use async_trait::async_trait;
use core::fmt;
use std::sync::Arc;

type GetScaleFn = Arc<dyn Fn(&dyn Object) -> Option<Scale> + Send + Sync>;
type SetScaleFn = Arc<dyn Fn(&mut dyn Object, &Scale) -> bool + Send + Sync>;

/// Type-erased [`HasScale`] accessors.
#[derive(Clone)]
pub struct ScaleFns {
    get: GetScaleFn,
    set: SetScaleFn,
}

impl ScaleFns {
    /// Accessors of `T`.
    #[must_use]
    pub fn of<T: HasScale>() -> Self {
        Self {
            get: Arc::new(|obj: &dyn Object| obj.downcast_ref::<T>().map(HasScale::scale)),
            set: Arc::new(|obj: &mut dyn Object, scale: &Scale| {
                obj.downcast_mut::<T>()
                    .map(|typed| typed.set_scale(scale))
                    .is_some()
            }),
        }
    }

    /// Accessors looked up from `current` on every call.
    pub(crate) fn deferred<F>(current: F) -> Self
    where
        F: Fn() -> Option<ScaleFns> + Send + Sync + 'static,
    {
        let current = Arc::new(current);
        let get_current = current.clone();
        Self {
            get: Arc::new(move |obj: &dyn Object| get_current().and_then(|fns| (fns.get)(obj))),
            set: Arc::new(move |obj: &mut dyn Object, scale: &Scale| {
                current().is_some_and(|fns| (fns.set)(obj, scale))
            }),
        }
    }

    /// Extracts the scale view, with identity metadata taken from `obj`.
    ///
    /// Returns `None` if `obj` does not declare scale.
    #[must_use]
    pub fn scale_of(&self, obj: &dyn Object) -> Option<Scale> {
        let mut scale = (self.get)(obj)?;
        let meta = obj.meta();
        scale.metadata.name.clone_from(&meta.name);
        scale.metadata.namespace.clone_from(&meta.namespace);
        scale.metadata.uid.clone_from(&meta.uid);
        scale.metadata.resource_version.clone_from(&meta.resource_version);
        Some(scale)
    }

    /// Writes `scale` into `obj`. Returns `false` if `obj` does not declare scale.
    pub fn set_scale(&self, obj: &mut dyn Object, scale: &Scale) -> bool {
        (self.set)(obj, scale)
    }

    fn require_scale(&self, obj: &dyn Object) -> Result<Scale, ApiError> {
        self.scale_of(obj).ok_or_else(|| {
            ApiError::Internal(format!("{} does not declare a scale subresource", obj.kind()))
        })
    }
}

impl fmt::Debug for ScaleFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleFns").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ScaleStorage
// ─────────────────────────────────────────────────────────────────────────────

/// Serves `get` and `update` of a parent's scale view.
pub struct ScaleStorage {
    resource: GroupResource,
    parent: ParentStorage,
    getter: Arc<dyn Getter>,
    updater: Arc<dyn Updater>,
    fns: ScaleFns,
}

impl ScaleStorage {
    /// Wraps the parent's read and write capabilities.
    ///
    /// Parent calls run with a read view of the parent bound into the
    /// request context.
    #[must_use]
    pub fn new(
        resource: GroupResource,
        getter: Arc<dyn Getter>,
        updater: Arc<dyn Updater>,
        fns: ScaleFns,
    ) -> Self {
        Self {
            resource,
            parent: ParentStorage::getter(getter.clone()),
            getter,
            updater,
            fns,
        }
    }
}

impl fmt::Debug for ScaleStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleStorage")
            .field("resource", &self.resource)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Storage for ScaleStorage {
    fn new_object(&self) -> Box<dyn Object> {
        Box::new(Scale::default())
    }

    fn group_version_kind(&self, _containing: &GroupVersion) -> Option<GroupVersionKind> {
        Some(Scale::group_version_kind())
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }

    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for ScaleStorage {
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        let ctx = ctx.with_parent(self.parent.clone());
        let parent = self.getter.get(&ctx, name, options).await?;
        Ok(Box::new(self.fns.require_scale(parent.as_ref())?))
    }
}

#[async_trait]
impl Updater for ScaleStorage {
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
        let info = ScaleUpdatedObjectInfo::new(obj_info, self.fns.clone());
        let create_validation =
            create_validation.map(|validate| scale_create_validation(validate, self.fns.clone()));
        let update_validation =
            update_validation.map(|validate| scale_update_validation(validate, self.fns.clone()));

        let (updated, created) = self
            .updater
            .update(&ctx, name, &info, create_validation, update_validation, options)
            .await?;
        tracing::debug!(resource = %self.resource, name, "updated scale");
        Ok((Box::new(self.fns.require_scale(updated.as_ref())?), created))
    }
}

fn scale_create_validation(validate: ValidateObjectFn, fns: ScaleFns) -> ValidateObjectFn {
    Arc::new(move |ctx: &RequestContext, obj: &dyn Object| {
        validate(ctx, &fns.require_scale(obj)?)
    })
}

fn scale_update_validation(validate: ValidateObjectUpdateFn, fns: ScaleFns) -> ValidateObjectUpdateFn {
    Arc::new(move |ctx: &RequestContext, obj: &dyn Object, old: &dyn Object| {
        validate(ctx, &fns.require_scale(obj)?, &fns.require_scale(old)?)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// ScaleUpdatedObjectInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a scale-shaped update against a stored parent object.
///
/// The wrapped update sees the scale view of the stored parent as its old
/// object. Its result is written into a copy of the parent. A resource
/// version on the new scale becomes the parent's, so a stale scale fails
/// the parent update with a conflict.
pub struct ScaleUpdatedObjectInfo<'a> {
    inner: &'a dyn UpdatedObjectInfo,
    fns: ScaleFns,
}

impl<'a> ScaleUpdatedObjectInfo<'a> {
    /// Wraps a scale-shaped update.
    #[must_use]
    pub fn new(inner: &'a dyn UpdatedObjectInfo, fns: ScaleFns) -> Self {
        Self { inner, fns }
    }
}

impl UpdatedObjectInfo for ScaleUpdatedObjectInfo<'_> {
    fn preconditions(&self) -> Option<Preconditions> {
        self.inner.preconditions()
    }

    fn updated_object(&self, ctx: &RequestContext, old: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        let old_scale = self.fns.require_scale(old)?;
        let updated = self.inner.updated_object(ctx, &old_scale)?;
        let scale = updated.downcast_ref::<Scale>().ok_or_else(|| {
            ApiError::BadRequest(format!(
                "wrong object passed to {} update: {}",
                Scale::KIND,
                updated.kind()
            ))
        })?;

        let mut parent = old.clone_object();
        if !self.fns.set_scale(parent.as_mut(), scale) {
            return Err(ApiError::Internal(format!(
                "{} does not declare a scale subresource",
                old.kind()
            )));
        }
        if !scale.metadata.resource_version.is_empty() {
            parent
                .meta_mut()
                .resource_version
                .clone_from(&scale.metadata.resource_version);
        }
        Ok(parent)
    }
}
