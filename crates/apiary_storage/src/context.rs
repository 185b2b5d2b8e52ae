//! Request-scoped environment.
//!
//! A [`RequestContext`] travels with every storage call. Besides the request
//! namespace and cancellation signal it can carry the storage handle of a
//! parent resource, bound by subresource adapters before they delegate:
//!
//! ```
//! use apiary_storage::context::RequestContext;
//!
//! let ctx = RequestContext::new().with_namespace("default");
//! assert_eq!(ctx.namespace(), Some("default"));
//! assert!(ctx.parent_getter().is_none());
//! ```
//!
//! Contexts are never mutated in place. Every `with_*` call derives a new
//! context, so a binding made for one delegated call cannot leak into the
//! caller's context or into another request.

use crate::error::ApiError;
use crate::rest::{Getter, StandardStorage, Storage};
use core::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// ParentStorage
// ─────────────────────────────────────────────────────────────────────────────

/// A parent storage handle bound into a request context.
///
/// Holds the handle itself plus the capability views the binder chose to
/// expose. A binding made with [`ParentStorage::getter`] only ever hands out
/// a read view, even if the underlying handle could do more.
#[derive(Clone)]
pub struct ParentStorage {
    handle: Arc<dyn Storage>,
    getter: Option<Arc<dyn Getter>>,
    standard: Option<Arc<dyn StandardStorage>>,
}

impl ParentStorage {
    /// Binds a read-only view of the parent.
    #[must_use]
    pub fn getter(getter: Arc<dyn Getter>) -> Self {
        Self {
            handle: getter.clone(),
            getter: Some(getter),
            standard: None,
        }
    }

    /// Binds the full parent storage.
    #[must_use]
    pub fn standard(storage: Arc<dyn StandardStorage>) -> Self {
        Self {
            handle: storage.clone(),
            getter: Some(storage.clone()),
            standard: Some(storage),
        }
    }

    /// The bound handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<dyn Storage> {
        &self.handle
    }

    /// The read view, if bound.
    #[must_use]
    pub fn as_getter(&self) -> Option<Arc<dyn Getter>> {
        self.getter.clone()
    }

    /// The full storage view, if bound.
    #[must_use]
    pub fn as_standard(&self) -> Option<Arc<dyn StandardStorage>> {
        self.standard.clone()
    }

    /// Returns `true` if this binding wraps exactly `handle`.
    #[must_use]
    pub fn is(&self, handle: &Arc<dyn Storage>) -> bool {
        core::ptr::addr_eq(Arc::as_ptr(&self.handle), Arc::as_ptr(handle))
    }
}

impl fmt::Debug for ParentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentStorage")
            .field("kind", &self.handle.new_object().kind())
            .field("getter", &self.getter.is_some())
            .field("standard", &self.standard.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestContext
// ─────────────────────────────────────────────────────────────────────────────

/// Environment threaded through every storage call.
#[derive(Clone, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    cancellation: CancellationToken,
    parent: Option<ParentStorage>,
}

impl RequestContext {
    /// Creates a context for a cluster-scoped request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context for a request in `namespace`.
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }

    /// The request namespace.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Derives a context cancelled by `token`.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancellation: token,
            ..self.clone()
        }
    }

    /// The cancellation token of the request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails if the request has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Cancelled`] once the token fires.
    pub fn ensure_active(&self) -> Result<(), ApiError> {
        if self.is_cancelled() {
            Err(ApiError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Derives a context carrying `parent`.
    ///
    /// The namespace and cancellation token carry over, so cancelling the
    /// request still reaches the parent call.
    #[must_use]
    pub fn with_parent(&self, parent: ParentStorage) -> Self {
        Self {
            parent: Some(parent),
            ..self.clone()
        }
    }

    /// The bound parent, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&ParentStorage> {
        self.parent.as_ref()
    }

    /// The parent's read view, or `None` outside a subresource call.
    #[must_use]
    pub fn parent_getter(&self) -> Option<Arc<dyn Getter>> {
        self.parent.as_ref().and_then(ParentStorage::as_getter)
    }

    /// The parent's full storage, or `None` outside a subresource call or
    /// when only a read view was bound.
    #[must_use]
    pub fn parent_storage(&self) -> Option<Arc<dyn StandardStorage>> {
        self.parent.as_ref().and_then(ParentStorage::as_standard)
    }

    /// The parent's read view, for components that cannot work without it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if no parent is bound or the binding
    /// has no read view.
    pub fn require_parent_getter(&self) -> Result<Arc<dyn Getter>, ApiError> {
        let parent = self.require_parent()?;
        parent.as_getter().ok_or_else(|| {
            ApiError::Internal(format!("parent storage {parent:?} does not support get"))
        })
    }

    /// The parent's full storage, for components that cannot work without it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if no parent is bound or the binding
    /// is not full storage.
    pub fn require_parent_storage(&self) -> Result<Arc<dyn StandardStorage>, ApiError> {
        let parent = self.require_parent()?;
        parent.as_standard().ok_or_else(|| {
            ApiError::Internal(format!("parent storage {parent:?} is not standard storage"))
        })
    }

    fn require_parent(&self) -> Result<&ParentStorage, ApiError> {
        self.parent
            .as_ref()
            .ok_or_else(|| ApiError::Internal("no parent storage bound to request context".into()))
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("namespace", &self.namespace)
            .field("cancelled", &self.is_cancelled())
            .field("parent", &self.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GetOptions;
    use apiary_runtime::{Object, Scale};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Scales;

    impl Storage for Scales {
        fn new_object(&self) -> Box<dyn Object> {
            Box::new(Scale::default())
        }

        fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
            Some(self)
        }
    }

    #[async_trait]
    impl Getter for Scales {
        async fn get(
            &self,
            _ctx: &RequestContext,
            _name: &str,
            _options: &GetOptions,
        ) -> Result<Box<dyn Object>, ApiError> {
            Ok(Box::new(Scale::new(1, 1, "")))
        }
    }

    #[test]
    fn absent_parent_reports_not_present() {
        let ctx = RequestContext::new();
        assert!(ctx.parent().is_none());
        assert!(ctx.parent_getter().is_none());
        assert!(ctx.parent_storage().is_none());
        assert_eq!(ctx.require_parent_getter().err().unwrap().code(), 500);
    }

    #[test]
    fn binding_derives_a_new_context() {
        let scales = Arc::new(Scales);
        let handle: Arc<dyn Storage> = scales.clone();
        let outer = RequestContext::new().with_namespace("default");
        let inner = outer.with_parent(ParentStorage::getter(scales));

        assert!(outer.parent().is_none());
        assert!(inner.parent().unwrap().is(&handle));
        assert_eq!(inner.namespace(), Some("default"));

        let getter: Arc<dyn Storage> = inner.parent_getter().unwrap();
        assert!(core::ptr::addr_eq(Arc::as_ptr(&getter), Arc::as_ptr(&handle)));
    }

    #[test]
    fn wrong_shape_fails_when_required() {
        let ctx = RequestContext::new().with_parent(ParentStorage::getter(Arc::new(Scales)));

        assert!(ctx.parent_storage().is_none());
        let err = ctx.require_parent_storage().err().unwrap();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(ctx.require_parent_getter().is_ok());
    }

    #[test]
    fn cancellation_carries_into_derived_contexts() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new().with_cancellation(token.clone());
        let bound = ctx.with_parent(ParentStorage::getter(Arc::new(Scales)));

        assert!(bound.ensure_active().is_ok());
        token.cancel();
        assert_eq!(bound.ensure_active(), Err(ApiError::Cancelled));
    }
}
