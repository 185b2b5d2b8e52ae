//! Create and update strategies for the generic [`Store`](crate::store::Store).

use crate::context::RequestContext;
use crate::error::{ApiError, FieldError};
use apiary_runtime::Object;
use core::fmt;
use std::sync::Arc;

/// Validates a new object.
pub type ValidateFn = Arc<dyn Fn(&dyn Object) -> Vec<FieldError> + Send + Sync>;

/// Validates an updated object, given `(new, old)`.
pub type ValidateUpdateFn = Arc<dyn Fn(&dyn Object, &dyn Object) -> Vec<FieldError> + Send + Sync>;

/// Copies the status portion of the first object onto the second.
pub type CopyStatusFn = Arc<dyn Fn(&dyn Object, &mut dyn Object) + Send + Sync>;

/// Resource-specific behavior of the generic store.
pub trait Strategy: Send + Sync + 'static {
    /// Whether objects live in namespaces.
    fn namespace_scoped(&self) -> bool;

    /// Normalizes a new object before validation.
    fn prepare_for_create(&self, _ctx: &RequestContext, obj: &mut dyn Object) {
        obj.meta_mut().generation = 1;
    }

    /// Normalizes an updated object before validation.
    ///
    /// May replace `obj` outright.
    ///
    /// # Errors
    ///
    /// Returns an error if the update must be refused.
    fn prepare_for_update(
        &self,
        _ctx: &RequestContext,
        obj: &mut Box<dyn Object>,
        old: &dyn Object,
    ) -> Result<(), ApiError> {
        let generation = old.meta().generation;
        let changed = spec_changed(obj.as_ref(), old)?;
        obj.meta_mut().generation = if changed { generation + 1 } else { generation };
        Ok(())
    }

    /// Validates a new object.
    fn validate(&self, _ctx: &RequestContext, _obj: &dyn Object) -> Vec<FieldError> {
        Vec::new()
    }

    /// Validates an updated object against the stored one.
    fn validate_update(
        &self,
        _ctx: &RequestContext,
        _obj: &dyn Object,
        _old: &dyn Object,
    ) -> Vec<FieldError> {
        Vec::new()
    }

    /// Brings a validated object into canonical form.
    fn canonicalize(&self, _obj: &mut dyn Object) {}

    /// Whether an update of a missing object creates it.
    fn allow_create_on_update(&self) -> bool {
        false
    }

    /// Whether an update without a resource version overwrites unconditionally.
    fn allow_unconditional_update(&self) -> bool {
        true
    }
}

/// Returns `true` if anything besides metadata and status differs.
fn spec_changed(obj: &dyn Object, old: &dyn Object) -> Result<bool, ApiError> {
    let strip = |obj: &dyn Object| {
        obj.to_value()
            .map(|mut value| {
                if let Some(map) = value.as_object_mut() {
                    map.remove("metadata");
                    map.remove("status");
                }
                value
            })
            .map_err(|e| ApiError::Internal(format!("encoding {}: {e}", obj.kind())))
    };
    Ok(strip(obj)? != strip(old)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// DefaultStrategy
// ─────────────────────────────────────────────────────────────────────────────

/// Strategy driven by optional validation functions.
#[derive(Clone, Default)]
pub struct DefaultStrategy {
    namespaced: bool,
    validate: Option<ValidateFn>,
    validate_update: Option<ValidateUpdateFn>,
}

impl DefaultStrategy {
    /// Creates a strategy with no validation.
    #[must_use]
    pub fn new(namespaced: bool) -> Self {
        Self {
            namespaced,
            ..Self::default()
        }
    }

    /// Sets the validation of new objects.
    #[must_use]
    pub fn with_validation(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Sets the validation of updates.
    #[must_use]
    pub fn with_update_validation(mut self, validate: ValidateUpdateFn) -> Self {
        self.validate_update = Some(validate);
        self
    }
}

impl fmt::Debug for DefaultStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultStrategy")
            .field("namespaced", &self.namespaced)
            .field("validate", &self.validate.is_some())
            .field("validate_update", &self.validate_update.is_some())
            .finish()
    }
}

impl Strategy for DefaultStrategy {
    fn namespace_scoped(&self) -> bool {
        self.namespaced
    }

    fn validate(&self, _ctx: &RequestContext, obj: &dyn Object) -> Vec<FieldError> {
        self.validate
            .as_ref()
            .map(|validate| validate(obj))
            .unwrap_or_default()
    }

    fn validate_update(
        &self,
        _ctx: &RequestContext,
        obj: &dyn Object,
        old: &dyn Object,
    ) -> Vec<FieldError> {
        self.validate_update
            .as_ref()
            .map(|validate| validate(obj, old))
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StatusStrategy
// ─────────────────────────────────────────────────────────────────────────────

/// Update strategy of a status subresource.
///
/// Keeps the stored object and takes only its status from the update.
/// Everything else is delegated to the resource's own strategy.
pub struct StatusStrategy {
    inner: Arc<dyn Strategy>,
    copy_status: CopyStatusFn,
}

impl StatusStrategy {
    /// Wraps the resource strategy.
    #[must_use]
    pub fn new(inner: Arc<dyn Strategy>, copy_status: CopyStatusFn) -> Self {
        Self { inner, copy_status }
    }
}

impl fmt::Debug for StatusStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStrategy").finish_non_exhaustive()
    }
}

impl Strategy for StatusStrategy {
    fn namespace_scoped(&self) -> bool {
        self.inner.namespace_scoped()
    }

    fn prepare_for_update(
        &self,
        _ctx: &RequestContext,
        obj: &mut Box<dyn Object>,
        old: &dyn Object,
    ) -> Result<(), ApiError> {
        let mut merged = old.clone_object();
        (self.copy_status)(obj.as_ref(), merged.as_mut());
        *obj = merged;
        Ok(())
    }

    fn validate_update(
        &self,
        ctx: &RequestContext,
        obj: &dyn Object,
        old: &dyn Object,
    ) -> Vec<FieldError> {
        self.inner.validate_update(ctx, obj, old)
    }

    fn canonicalize(&self, obj: &mut dyn Object) {
        self.inner.canonicalize(obj);
    }

    fn allow_create_on_update(&self) -> bool {
        false
    }

    fn allow_unconditional_update(&self) -> bool {
        self.inner.allow_unconditional_update()
    }
}
