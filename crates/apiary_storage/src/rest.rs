//! Storage handles and their capabilities.
//!
//! Every route is served by an `Arc<dyn Storage>`. What a handle can do is
//! discovered through the `as_*` probes, each returning a narrower trait
//! object sharing the same allocation, so capability checks never copy or
//! re-wrap the handle:
//!
//! ```
//! # use apiary_storage::rest::{Capability, Storage};
//! # use std::sync::Arc;
//! fn describe(handle: &Arc<dyn Storage>) -> Vec<Capability> {
//!     Capability::ALL
//!         .into_iter()
//!         .filter(|cap| cap.is_supported_by(handle))
//!         .collect()
//! }
//! ```

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::request::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions, UpdatedObjectInfo,
};
use apiary_runtime::{GroupVersion, GroupVersionKind, Object, ObjectList, ObjectMeta, TypedObject};
use async_trait::async_trait;
use core::fmt;
use downcast_rs::{DowncastSync, impl_downcast};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Creates an empty object of a handle's kind.
pub type NewObjectFn = Arc<dyn Fn() -> Box<dyn Object> + Send + Sync>;

/// Admission-style check run on a new object before it is persisted.
pub type ValidateObjectFn =
    Arc<dyn Fn(&RequestContext, &dyn Object) -> Result<(), ApiError> + Send + Sync>;

/// Admission-style check run on an updated object, given `(new, old)`.
pub type ValidateObjectUpdateFn =
    Arc<dyn Fn(&RequestContext, &dyn Object, &dyn Object) -> Result<(), ApiError> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// A request-serving storage handle.
///
/// Implementors override the `as_*` probe of every capability they
/// implement, returning `Some(self)`.
pub trait Storage: DowncastSync {
    /// Creates an empty object of the kind this handle serves.
    fn new_object(&self) -> Box<dyn Object>;

    /// Kind served when the handle is mounted under `containing`, if it
    /// differs from the kind of the containing resource.
    fn group_version_kind(&self, _containing: &GroupVersion) -> Option<GroupVersionKind> {
        None
    }

    /// Probes for [`Getter`].
    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        None
    }

    /// Probes for [`Lister`].
    fn as_lister(self: Arc<Self>) -> Option<Arc<dyn Lister>> {
        None
    }

    /// Probes for [`Creater`].
    fn as_creater(self: Arc<Self>) -> Option<Arc<dyn Creater>> {
        None
    }

    /// Probes for [`Updater`].
    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        None
    }

    /// Probes for [`Deleter`].
    fn as_deleter(self: Arc<Self>) -> Option<Arc<dyn Deleter>> {
        None
    }

    /// Probes for [`Connecter`].
    fn as_connecter(self: Arc<Self>) -> Option<Arc<dyn Connecter>> {
        None
    }

    /// Probes for [`StandardStorage`].
    fn as_standard(self: Arc<Self>) -> Option<Arc<dyn StandardStorage>> {
        None
    }
}

impl_downcast!(sync Storage);

impl fmt::Debug for dyn Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.new_object().kind())
            .finish_non_exhaustive()
    }
}

/// Reads single objects.
#[async_trait]
pub trait Getter: Storage {
    /// Returns the named object.
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError>;
}

/// Lists objects.
#[async_trait]
pub trait Lister: Storage {
    /// Creates an empty list of the kind this handle serves.
    fn new_list(&self) -> ObjectList;

    /// Lists the objects matching `options`.
    async fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<ObjectList, ApiError>;
}

/// Creates objects.
#[async_trait]
pub trait Creater: Storage {
    /// Persists a new object and returns it as stored.
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Box<dyn Object>,
        create_validation: Option<ValidateObjectFn>,
        options: &CreateOptions,
    ) -> Result<Box<dyn Object>, ApiError>;
}

/// Updates objects.
#[async_trait]
pub trait Updater: Storage {
    /// Applies `obj_info` to the named object.
    ///
    /// Returns the stored object and whether it was created.
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo,
        create_validation: Option<ValidateObjectFn>,
        update_validation: Option<ValidateObjectUpdateFn>,
        options: &UpdateOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError>;
}

/// Deletes objects.
#[async_trait]
pub trait Deleter: Storage {
    /// Deletes the named object.
    ///
    /// Returns the deleted object and whether deletion completed immediately.
    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError>;
}

/// Full create/read/update/delete/list storage.
pub trait StandardStorage: Getter + Lister + Creater + Updater + Deleter {}

impl<T: Getter + Lister + Creater + Updater + Deleter> StandardStorage for T {}

// ─────────────────────────────────────────────────────────────────────────────
// Connect
// ─────────────────────────────────────────────────────────────────────────────

/// A request streamed to a connect handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Path below the subresource.
    pub path: String,
    /// Request body.
    pub body: Vec<u8>,
}

/// The reply of a connect handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// Serves the stream opened by [`Connecter::connect`].
#[async_trait]
pub trait ConnectHandler: Send + Sync {
    /// Handles one request on the connection.
    async fn serve(&self, request: ConnectRequest) -> Result<ConnectResponse, ApiError>;
}

/// Options sent with a connect request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Unused, present so the options decode like any object.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Path below the subresource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Query parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl TypedObject for ConnectOptions {
    const KIND: &'static str = "ConnectOptions";

    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Opens bidirectional streams, like `exec` or `logs`.
#[async_trait]
pub trait Connecter: Storage {
    /// Opens a connection to the named object.
    async fn connect(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: Box<dyn Object>,
    ) -> Result<Box<dyn ConnectHandler>, ApiError>;

    /// Returns an empty options object, whether the request path is
    /// forwarded, and the options field the path is stored in.
    fn new_connect_options(&self) -> (Box<dyn Object>, bool, String);

    /// HTTP methods the connection accepts.
    fn connect_methods(&self) -> Vec<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// A storage capability, used in diagnostics and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// [`Getter`]
    Get,
    /// [`Lister`]
    List,
    /// [`Creater`]
    Create,
    /// [`Updater`]
    Update,
    /// [`Deleter`]
    Delete,
    /// [`Connecter`]
    Connect,
    /// [`StandardStorage`]
    Standard,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Connect,
        Self::Standard,
    ];

    /// Returns `true` if `handle` implements the capability.
    #[must_use]
    pub fn is_supported_by(self, handle: &Arc<dyn Storage>) -> bool {
        let handle = Arc::clone(handle);
        match self {
            Self::Get => handle.as_getter().is_some(),
            Self::List => handle.as_lister().is_some(),
            Self::Create => handle.as_creater().is_some(),
            Self::Update => handle.as_updater().is_some(),
            Self::Delete => handle.as_deleter().is_some(),
            Self::Connect => handle.as_connecter().is_some(),
            Self::Standard => handle.as_standard().is_some(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Connect => "connect",
            Self::Standard => "get, list, create, update and delete",
        })
    }
}
