//! Shared resource types and storage handles for integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use apiary_builder::descriptor::{HasScale, HasStatus, MultiVersion, Resource, Validator};
use apiary_builder::registry::ResourceRegistry;
use apiary_builder::route::RouteTable;
use apiary_runtime::{GroupVersionResource, Object, ObjectMeta, Scale, TypedObject};
use apiary_storage::config::{StorageConfig, StorageOptions};
use apiary_storage::context::{ParentStorage, RequestContext};
use apiary_storage::request::{GetOptions, UpdateOptions, UpdatedObjectInfo};
use apiary_storage::rest::{
    ConnectHandler, ConnectOptions, ConnectRequest, ConnectResponse, Connecter, Getter, Storage,
    Updater, ValidateObjectFn, ValidateObjectUpdateFn,
};
use apiary_storage::{ApiError, FieldError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use std::sync::Arc;

pub const GROUP: &str = "wardle.example.com";

// ─────────────────────────────────────────────────────────────────────────────
// Flunder (two versions)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderSpec {
    #[serde(default)]
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderStatus {
    #[serde(default)]
    pub phase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flunder {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FlunderSpec,
    #[serde(default)]
    pub status: FlunderStatus,
}

impl Flunder {
    pub fn new(name: &str, reference: &str) -> Self {
        Self {
            metadata: ObjectMeta::namespaced("default", name),
            spec: FlunderSpec {
                reference: reference.into(),
            },
            status: FlunderStatus::default(),
        }
    }
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
        GroupVersionResource::new(GROUP, "v1alpha1", "flunders")
    }
}

impl HasStatus for Flunder {
    fn copy_status_to(&self, target: &mut Self) {
        target.status = self.status.clone();
    }
}

impl Validator for Flunder {
    fn validate(&self) -> Vec<FieldError> {
        if self.spec.reference.is_empty() {
            vec![FieldError::new("spec.reference", "must be set")]
        } else {
            Vec::new()
        }
    }
}

/// `v1beta1` calls the reference a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderV1beta1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub phase: String,
}

impl TypedObject for FlunderV1beta1 {
    const KIND: &'static str = "Flunder";
    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for FlunderV1beta1 {
    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource::new(GROUP, "v1beta1", "flunders")
    }
    fn is_storage_version() -> bool {
        false
    }
}

impl HasStatus for FlunderV1beta1 {
    fn copy_status_to(&self, target: &mut Self) {
        target.phase = self.phase.clone();
    }
}

impl MultiVersion<Flunder> for FlunderV1beta1 {
    fn convert_to_storage(&self) -> Result<Flunder, String> {
        Ok(Flunder {
            metadata: self.metadata.clone(),
            spec: FlunderSpec {
                reference: self.target.clone(),
            },
            status: FlunderStatus {
                phase: self.phase.clone(),
            },
        })
    }

    fn convert_from_storage(storage: &Flunder) -> Result<Self, String> {
        Ok(Self {
            metadata: storage.metadata.clone(),
            target: storage.spec.reference.clone(),
            phase: storage.status.phase.clone(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet (status and scale)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSpec {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    #[serde(default)]
    pub ready: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FleetSpec,
    #[serde(default)]
    pub status: FleetStatus,
}

impl Fleet {
    pub fn new(name: &str, replicas: i32) -> Self {
        Self {
            metadata: ObjectMeta::namespaced("default", name),
            spec: FleetSpec {
                replicas,
                selector: "app=x".into(),
                image: "fleet:1".into(),
            },
            status: FleetStatus::default(),
        }
    }
}

impl TypedObject for Fleet {
    const KIND: &'static str = "Fleet";
    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for Fleet {
    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource::new(GROUP, "v1alpha1", "fleets")
    }
}

impl HasStatus for Fleet {
    fn copy_status_to(&self, target: &mut Self) {
        target.status = self.status.clone();
    }
}

impl HasScale for Fleet {
    fn scale(&self) -> Scale {
        Scale::new(self.spec.replicas, self.status.ready, self.spec.selector.clone())
    }

    fn set_scale(&mut self, scale: &Scale) {
        self.spec.replicas = scale.spec.replicas;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fortune (read-only handler)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fortune {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub status: String,
}

impl TypedObject for Fortune {
    const KIND: &'static str = "Fortune";
    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for Fortune {
    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource::new(GROUP, "v1alpha1", "fortunes")
    }
    fn namespace_scoped() -> bool {
        false
    }
}

impl HasStatus for Fortune {
    fn copy_status_to(&self, target: &mut Self) {
        target.status = self.status.clone();
    }
}

impl HasScale for Fortune {
    fn scale(&self) -> Scale {
        Scale::new(1, 1, "")
    }

    fn set_scale(&mut self, _scale: &Scale) {}
}

/// Serves a fixed fortune for any name. Supports `get` only.
pub struct Fortunes;

impl Storage for Fortunes {
    fn new_object(&self) -> Box<dyn Object> {
        Box::new(Fortune::default())
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for Fortunes {
    async fn get(
        &self,
        _ctx: &RequestContext,
        name: &str,
        _options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        Ok(Box::new(Fortune {
            metadata: ObjectMeta::named(name),
            text: "a quiet week ahead".into(),
            status: String::new(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subresource handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Get/update subresource that records the parent bound into each call and
/// answers with the parent object.
#[derive(Default)]
pub struct ParentEcho {
    pub seen: Mutex<Vec<Option<ParentStorage>>>,
}

impl ParentEcho {
    pub fn last_parent(&self) -> Option<ParentStorage> {
        self.seen.lock().last().cloned().flatten()
    }
}

impl Storage for ParentEcho {
    fn new_object(&self) -> Box<dyn Object> {
        Box::new(Flunder::default())
    }

    fn as_getter(self: Arc<Self>) -> Option<Arc<dyn Getter>> {
        Some(self)
    }

    fn as_updater(self: Arc<Self>) -> Option<Arc<dyn Updater>> {
        Some(self)
    }
}

#[async_trait]
impl Getter for ParentEcho {
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Box<dyn Object>, ApiError> {
        self.seen.lock().push(ctx.parent().cloned());
        ctx.require_parent_storage()?.get(ctx, name, options).await
    }
}

#[async_trait]
impl Updater for ParentEcho {
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo,
        create_validation: Option<ValidateObjectFn>,
        update_validation: Option<ValidateObjectUpdateFn>,
        options: &UpdateOptions,
    ) -> Result<(Box<dyn Object>, bool), ApiError> {
        self.seen.lock().push(ctx.parent().cloned());
        ctx.require_parent_storage()?
            .update(ctx, name, obj_info, create_validation, update_validation, options)
            .await
    }
}

/// `logs` connector reporting the parent's desired replicas.
pub struct FleetLogs;

impl Storage for FleetLogs {
    fn new_object(&self) -> Box<dyn Object> {
        Box::new(ConnectOptions::default())
    }

    fn as_connecter(self: Arc<Self>) -> Option<Arc<dyn Connecter>> {
        Some(self)
    }
}

#[async_trait]
impl Connecter for FleetLogs {
    async fn connect(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: Box<dyn Object>,
    ) -> Result<Box<dyn ConnectHandler>, ApiError> {
        let parent = ctx
            .require_parent_getter()?
            .get(ctx, name, &GetOptions::default())
            .await?;
        let fleet = parent
            .downcast_ref::<Fleet>()
            .ok_or_else(|| ApiError::Internal("parent is not a fleet".into()))?;
        let tail = options
            .downcast_ref::<ConnectOptions>()
            .and_then(|options| options.params.get("tail").cloned())
            .unwrap_or_default();
        Ok(Box::new(LogStream {
            line: format!("{name}: {} replicas{tail}", fleet.spec.replicas),
        }))
    }

    fn new_connect_options(&self) -> (Box<dyn Object>, bool, String) {
        (Box::new(ConnectOptions::default()), true, "path".into())
    }

    fn connect_methods(&self) -> Vec<String> {
        vec!["GET".into()]
    }
}

struct LogStream {
    line: String,
}

#[async_trait]
impl ConnectHandler for LogStream {
    async fn serve(&self, request: ConnectRequest) -> Result<ConnectResponse, ApiError> {
        Ok(ConnectResponse {
            status: 200,
            body: format!("{} {}", request.method, self.line).into_bytes(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn options() -> Arc<StorageOptions> {
    Arc::new(StorageOptions::new(StorageConfig::default()))
}

pub fn finalize(registry: ResourceRegistry) -> RouteTable {
    registry.finalize(options()).expect("registration is valid")
}

pub fn ctx() -> RequestContext {
    RequestContext::new().with_namespace("default")
}
