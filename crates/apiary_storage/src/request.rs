//! Per-call options and update payloads.

use crate::context::RequestContext;
use crate::error::ApiError;
use apiary_runtime::{GroupResource, Object, ObjectMeta};
use serde_json::Value;

/// Options of a get call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Minimum resource version the read must reflect, ignored by the
    /// built-in backends which always read the latest state.
    pub resource_version: String,
}

/// Options of a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Label selector, e.g. `app=x,tier!=db,canary`.
    pub label_selector: Option<String>,
}

impl ListOptions {
    /// Lists objects matching a label selector.
    #[must_use]
    pub fn with_label_selector(selector: impl Into<String>) -> Self {
        Self {
            label_selector: Some(selector.into()),
        }
    }

    /// Returns `true` if the object's labels match the selector.
    ///
    /// Supported terms, comma separated: `key=value`, `key==value`,
    /// `key!=value`, `key` and `!key`.
    #[must_use]
    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        let Some(selector) = self.label_selector.as_deref() else {
            return true;
        };
        selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .all(|term| term_matches(term, meta))
    }
}

fn term_matches(term: &str, meta: &ObjectMeta) -> bool {
    if let Some((key, value)) = term.split_once("!=") {
        return meta.labels.get(key.trim()).map(String::as_str) != Some(value.trim());
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return meta.labels.get(key.trim()).map(String::as_str) == Some(value.trim());
    }
    if let Some(key) = term.strip_prefix('!') {
        return !meta.labels.contains_key(key.trim());
    }
    meta.labels.contains_key(term)
}

/// Options of a create call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Run every check but persist nothing.
    pub dry_run: bool,
}

/// Options of an update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Run every check but persist nothing.
    pub dry_run: bool,
    /// Create the object if it does not exist, even when the strategy
    /// forbids create-on-update.
    pub force_allow_create: bool,
}

/// Options of a delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Conditions the stored object must satisfy.
    pub preconditions: Option<Preconditions>,
    /// Run every check but persist nothing.
    pub dry_run: bool,
}

/// Conditions a stored object must satisfy before it is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// Expected uid.
    pub uid: Option<String>,
    /// Expected resource version.
    pub resource_version: Option<String>,
}

impl Preconditions {
    /// Checks the preconditions against the stored object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Conflict`] naming the first precondition that fails.
    pub fn check(&self, resource: &GroupResource, stored: &dyn Object) -> Result<(), ApiError> {
        let meta = stored.meta();
        if let Some(uid) = &self.uid
            && *uid != meta.uid
        {
            return Err(ApiError::conflict(
                resource,
                &meta.name,
                format!("precondition failed: uid in precondition: {uid}, uid in object meta: {}", meta.uid),
            ));
        }
        if let Some(rv) = &self.resource_version
            && *rv != meta.resource_version
        {
            return Err(ApiError::conflict(
                resource,
                &meta.name,
                format!(
                    "precondition failed: resourceVersion in precondition: {rv}, resourceVersion in object meta: {}",
                    meta.resource_version
                ),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UpdatedObjectInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Produces the new state of an object from its stored state.
///
/// Generic update logic receives one of these instead of a finished object,
/// so the same call can carry a full replacement or a patch.
pub trait UpdatedObjectInfo: Send + Sync {
    /// Conditions the stored object must satisfy.
    fn preconditions(&self) -> Option<Preconditions>;

    /// Computes the new object from the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be applied to `old`.
    fn updated_object(&self, ctx: &RequestContext, old: &dyn Object) -> Result<Box<dyn Object>, ApiError>;
}

/// Replaces the stored object with a given one.
#[derive(Debug, Clone)]
pub struct DefaultUpdatedObjectInfo {
    obj: Box<dyn Object>,
}

impl DefaultUpdatedObjectInfo {
    /// Wraps the replacement object.
    #[must_use]
    pub fn new(obj: Box<dyn Object>) -> Self {
        Self { obj }
    }
}

impl UpdatedObjectInfo for DefaultUpdatedObjectInfo {
    fn preconditions(&self) -> Option<Preconditions> {
        let uid = &self.obj.meta().uid;
        (!uid.is_empty()).then(|| Preconditions {
            uid: Some(uid.clone()),
            resource_version: None,
        })
    }

    fn updated_object(&self, _ctx: &RequestContext, _old: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        Ok(self.obj.clone_object())
    }
}

/// Applies a JSON merge patch (RFC 7386) to the stored object.
#[derive(Debug, Clone)]
pub struct MergePatchUpdatedObjectInfo {
    patch: Value,
}

impl MergePatchUpdatedObjectInfo {
    /// Wraps the patch document.
    #[must_use]
    pub fn new(patch: Value) -> Self {
        Self { patch }
    }
}

impl UpdatedObjectInfo for MergePatchUpdatedObjectInfo {
    fn preconditions(&self) -> Option<Preconditions> {
        let uid = self.patch.pointer("/metadata/uid")?.as_str()?;
        Some(Preconditions {
            uid: Some(uid.to_string()),
            resource_version: None,
        })
    }

    fn updated_object(&self, _ctx: &RequestContext, old: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        apply_merge_patch(old, &self.patch)
    }
}

/// Applies `patch` to a copy of `old`.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] if the patched document no longer
/// decodes as the object's type.
pub fn apply_merge_patch(old: &dyn Object, patch: &Value) -> Result<Box<dyn Object>, ApiError> {
    let mut doc = old
        .to_value()
        .map_err(|e| ApiError::Internal(format!("encoding {}: {e}", old.kind())))?;
    merge_patch(&mut doc, patch);

    let mut patched = old.clone_object();
    patched
        .load_value(doc)
        .map_err(|e| ApiError::BadRequest(format!("patched {} is invalid: {e}", old.kind())))?;
    Ok(patched)
}

/// Merges `patch` into `target` following RFC 7386.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
