//! Request dispatch.
//!
//! The [`Dispatcher`] is the serving side of a [`RouteTable`]: it picks the
//! route of each [`ApiRequest`], resolves the route's handle, converts bodies
//! between the requested version and the stored kind, and calls the
//! capability the verb needs.
//!
//! ```text
//! body ─► decode(request kind) ─► default ─► convert(storage kind) ─► handle
//! reply ◄─ encode ◄─ convert(request kind) ◄──────────────────────────┘
//! ```

use crate::route::{Route, RouteTable};
use apiary_runtime::{GroupVersionKind, GroupVersionResource, Object, ObjectList, Scheme};
use apiary_storage::ApiError;
use apiary_storage::context::RequestContext;
use apiary_storage::request::{
    CreateOptions, DefaultUpdatedObjectInfo, DeleteOptions, GetOptions, ListOptions,
    MergePatchUpdatedObjectInfo, Preconditions, UpdateOptions, UpdatedObjectInfo,
};
use apiary_storage::rest::{ConnectRequest, Storage};
use apiary_system::state::GlobalState;
use core::fmt;
use serde_json::Value;
use std::sync::Arc;

/// The operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read one object.
    Get,
    /// Read every object matching a selector.
    List,
    /// Create an object.
    Create,
    /// Replace an object.
    Update,
    /// Merge-patch an object.
    Patch,
    /// Delete an object.
    Delete,
    /// Open a connection to an object.
    Connect,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Connect => "connect",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiRequest / ApiResponse
// ─────────────────────────────────────────────────────────────────────────────

/// A request routed by resource, in the spirit of an HTTP API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    verb: Verb,
    resource: GroupVersionResource,
    namespace: Option<String>,
    name: Option<String>,
    body: Option<Value>,
    list_options: ListOptions,
    dry_run: bool,
    connect: Option<ConnectRequest>,
}

impl ApiRequest {
    fn new(verb: Verb, resource: GroupVersionResource) -> Self {
        Self {
            verb,
            resource,
            namespace: None,
            name: None,
            body: None,
            list_options: ListOptions::default(),
            dry_run: false,
            connect: None,
        }
    }

    fn named(verb: Verb, resource: GroupVersionResource, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(verb, resource)
        }
    }

    /// Reads `name`.
    #[must_use]
    pub fn get(resource: GroupVersionResource, name: impl Into<String>) -> Self {
        Self::named(Verb::Get, resource, name)
    }

    /// Lists the resource.
    #[must_use]
    pub fn list(resource: GroupVersionResource) -> Self {
        Self::new(Verb::List, resource)
    }

    /// Creates the object in `body`.
    #[must_use]
    pub fn create(resource: GroupVersionResource, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Verb::Create, resource)
        }
    }

    /// Replaces `name` with `body`.
    #[must_use]
    pub fn update(resource: GroupVersionResource, name: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::named(Verb::Update, resource, name)
        }
    }

    /// Applies the merge patch `patch` to `name`.
    #[must_use]
    pub fn patch(resource: GroupVersionResource, name: impl Into<String>, patch: Value) -> Self {
        Self {
            body: Some(patch),
            ..Self::named(Verb::Patch, resource, name)
        }
    }

    /// Deletes `name`.
    #[must_use]
    pub fn delete(resource: GroupVersionResource, name: impl Into<String>) -> Self {
        Self::named(Verb::Delete, resource, name)
    }

    /// Connects to `name` and sends `request` over the connection.
    #[must_use]
    pub fn connect(
        resource: GroupVersionResource,
        name: impl Into<String>,
        request: ConnectRequest,
    ) -> Self {
        Self {
            connect: Some(request),
            ..Self::named(Verb::Connect, resource, name)
        }
    }

    /// Scopes the request to `namespace`.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Filters a list by label selector.
    #[must_use]
    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.list_options = ListOptions::with_label_selector(selector);
        self
    }

    /// Sets the connect options document.
    #[must_use]
    pub fn with_connect_options(mut self, options: Value) -> Self {
        self.body = Some(options);
        self
    }

    /// Runs every check of a write without persisting it.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// The verb.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The addressed route.
    #[must_use]
    pub fn resource(&self) -> &GroupVersionResource {
        &self.resource
    }

    fn require_name(&self) -> Result<&str, ApiError> {
        self.name
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest(format!("{} requires a name", self.verb)))
    }

    fn require_body(&mut self) -> Result<Value, ApiError> {
        self.body
            .take()
            .ok_or_else(|| ApiError::BadRequest(format!("{} requires a body", self.verb)))
    }
}

/// The reply to an [`ApiRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub code: u16,
    /// Response document.
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { code: 200, body }
    }

    /// Status response of a failed request.
    #[must_use]
    pub fn from_error(error: &ApiError) -> Self {
        Self {
            code: error.code(),
            body: error.to_status(),
        }
    }

    /// Returns `true` for a 2xx code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Serves [`ApiRequest`]s from a [`RouteTable`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: RouteTable,
}

impl GlobalState for Dispatcher {}

impl Dispatcher {
    /// Creates a dispatcher over `routes`.
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    /// The route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Serves `request`, turning failures into status responses.
    pub async fn serve(&self, ctx: &RequestContext, request: ApiRequest) -> ApiResponse {
        let (verb, resource) = (request.verb, request.resource.clone());
        match self.handle(ctx, request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%verb, resource = %resource, error = %error, "request failed");
                ApiResponse::from_error(&error)
            }
        }
    }

    /// Serves `request`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::NotFound`] if nothing is routed at the resource
    /// - [`ApiError::ServiceUnavailable`] if the route's handle cannot be constructed
    /// - [`ApiError::MethodNotSupported`] if the handle lacks the verb's capability
    /// - [`ApiError::BadRequest`] for bodies that do not decode or convert
    /// - any error of the storage call, unchanged
    pub async fn handle(&self, ctx: &RequestContext, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        ctx.ensure_active()?;
        let gvr = request.resource.clone();
        let route = self
            .routes
            .route(&gvr)
            .ok_or_else(|| ApiError::not_found(&gvr.group_resource(), request.name.clone().unwrap_or_default()))?;
        let storage = self
            .routes
            .storage(&gvr)
            .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
        let ctx = match &request.namespace {
            Some(namespace) => ctx.with_namespace(namespace.clone()),
            None => ctx.clone(),
        };
        let codec = Codec {
            scheme: self.routes.scheme(),
            route,
        };
        let verb = request.verb;
        let unsupported = || ApiError::method_not_supported(gvr.resource.clone(), verb.to_string());

        match verb {
            Verb::Get => {
                let getter = storage.as_getter().ok_or_else(unsupported)?;
                let obj = getter
                    .get(&ctx, request.require_name()?, &GetOptions::default())
                    .await?;
                Ok(ApiResponse::ok(codec.encode(obj.as_ref())?))
            }
            Verb::List => {
                let lister = storage.as_lister().ok_or_else(unsupported)?;
                let list = lister.list(&ctx, &request.list_options).await?;
                Ok(ApiResponse::ok(codec.encode_list(list)?))
            }
            Verb::Create => {
                let creater = storage.as_creater().ok_or_else(unsupported)?;
                let obj = codec.decode(request.require_body()?)?;
                let options = CreateOptions {
                    dry_run: request.dry_run,
                };
                let created = creater.create(&ctx, obj, None, &options).await?;
                Ok(ApiResponse {
                    code: 201,
                    body: codec.encode(created.as_ref())?,
                })
            }
            Verb::Update | Verb::Patch => {
                let updater = storage.as_updater().ok_or_else(unsupported)?;
                let body = request.require_body()?;
                let options = UpdateOptions {
                    dry_run: request.dry_run,
                    force_allow_create: false,
                };
                let info: Box<dyn UpdatedObjectInfo + '_> = if verb == Verb::Update {
                    Box::new(DefaultUpdatedObjectInfo::new(codec.decode(body)?))
                } else {
                    Box::new(ConvertingPatch {
                        codec: &codec,
                        patch: MergePatchUpdatedObjectInfo::new(body),
                    })
                };
                let (updated, created) = updater
                    .update(&ctx, request.require_name()?, info.as_ref(), None, None, &options)
                    .await?;
                Ok(ApiResponse {
                    code: if created { 201 } else { 200 },
                    body: codec.encode(updated.as_ref())?,
                })
            }
            Verb::Delete => {
                let deleter = storage.as_deleter().ok_or_else(unsupported)?;
                let (deleted, _) = deleter
                    .delete(&ctx, request.require_name()?, &DeleteOptions::default())
                    .await?;
                Ok(ApiResponse::ok(codec.encode(deleted.as_ref())?))
            }
            Verb::Connect => self.connect(&ctx, storage, &mut request).await,
        }
    }

    async fn connect(
        &self,
        ctx: &RequestContext,
        storage: Arc<dyn Storage>,
        request: &mut ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        let connecter = storage.as_connecter().ok_or_else(|| {
            ApiError::method_not_supported(request.resource.resource.clone(), Verb::Connect.to_string())
        })?;
        let (mut options, _, _) = connecter.new_connect_options();
        if let Some(body) = request.body.take() {
            options
                .load_value(body)
                .map_err(|e| ApiError::BadRequest(format!("invalid connect options: {e}")))?;
        }
        let handler = connecter
            .connect(ctx, request.require_name()?, options)
            .await?;
        let reply = handler
            .serve(request.connect.take().unwrap_or_default())
            .await?;
        Ok(ApiResponse {
            code: reply.status,
            body: Value::String(String::from_utf8_lossy(&reply.body).into_owned()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Converts between a route's request kind and storage kind.
struct Codec<'a> {
    scheme: &'a Scheme,
    route: &'a Route,
}

impl Codec<'_> {
    /// Decodes a request body into the stored kind, applying defaults.
    fn decode(&self, mut body: Value) -> Result<Box<dyn Object>, ApiError> {
        if let Some(fields) = body.as_object_mut() {
            fields.remove("apiVersion");
            fields.remove("kind");
        }
        let mut obj = self
            .scheme
            .decode(self.route.request_kind(), body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        self.scheme.apply_defaults(obj.as_mut());
        self.to_storage(obj.as_ref())
    }

    fn to_storage(&self, obj: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        self.scheme
            .convert(obj, self.route.storage_kind())
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    fn to_request(&self, obj: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        self.scheme
            .convert(obj, self.route.request_kind())
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Encodes a stored object as the requested kind.
    fn encode(&self, obj: &dyn Object) -> Result<Value, ApiError> {
        let converted = self.to_request(obj)?;
        let mut value = converted
            .to_value()
            .map_err(|e| ApiError::Internal(format!("encoding {}: {e}", obj.kind())))?;
        if let Some(fields) = value.as_object_mut() {
            let gvk: &GroupVersionKind = self.route.request_kind();
            fields.insert("apiVersion".into(), Value::String(gvk.group_version().to_string()));
            fields.insert("kind".into(), Value::String(gvk.kind.clone()));
        }
        Ok(value)
    }

    fn encode_list(&self, list: ObjectList) -> Result<Value, ApiError> {
        let items = list
            .items
            .iter()
            .map(|item| self.encode(item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::json!({
            "apiVersion": self.route.request_kind().group_version().to_string(),
            "kind": self.route.list_kind(),
            "metadata": { "resourceVersion": list.resource_version },
            "items": items,
        }))
    }
}

/// Applies a merge patch in the requested version rather than the stored one.
struct ConvertingPatch<'a> {
    codec: &'a Codec<'a>,
    patch: MergePatchUpdatedObjectInfo,
}

impl UpdatedObjectInfo for ConvertingPatch<'_> {
    fn preconditions(&self) -> Option<Preconditions> {
        self.patch.preconditions()
    }

    fn updated_object(&self, ctx: &RequestContext, old: &dyn Object) -> Result<Box<dyn Object>, ApiError> {
        let old = self.codec.to_request(old)?;
        let mut patched = self.patch.updated_object(ctx, old.as_ref())?;
        self.codec.scheme.apply_defaults(patched.as_mut());
        self.codec.to_storage(patched.as_ref())
    }
}
