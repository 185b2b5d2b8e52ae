use apiary_builder::descriptor::{Defaulter, HasScale, HasStatus, MultiVersion, Resource, Validator};
use apiary_runtime::{GroupVersionResource, Object, ObjectMeta, Scale, TypedObject};
use apiary_storage::context::RequestContext;
use apiary_storage::request::GetOptions;
use apiary_storage::rest::{
    ConnectHandler, ConnectOptions, ConnectRequest, ConnectResponse, Connecter, Getter, Storage,
};
use apiary_storage::{ApiError, FieldError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The API group of every wardle resource.
pub const GROUP: &str = "wardle.example.com";

macro_rules! object_meta_accessors {
    () => {
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Flunder
// ─────────────────────────────────────────────────────────────────────────────

/// Desired state of a [`Flunder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderSpec {
    /// Name of the referenced flunder or fischer.
    #[serde(default)]
    pub reference: String,
}

/// Observed state of a [`Flunder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderStatus {
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: String,
}

/// A flunder, stored as `v1alpha1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flunder {
    /// Standard metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: FlunderSpec,
    /// Observed state.
    #[serde(default)]
    pub status: FlunderStatus,
}

impl TypedObject for Flunder {
    const KIND: &'static str = "Flunder";
    object_meta_accessors!();
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

impl Defaulter for Flunder {
    fn set_defaults(&mut self) {
        if self.status.phase.is_empty() {
            self.status.phase = "Pending".into();
        }
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

/// The `v1beta1` flunder, which names its reference a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlunderV1beta1 {
    /// Standard metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Name of the referenced flunder or fischer.
    #[serde(default)]
    pub target: String,
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: String,
}

impl TypedObject for FlunderV1beta1 {
    const KIND: &'static str = "Flunder";
    object_meta_accessors!();
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
// Fischer
// ─────────────────────────────────────────────────────────────────────────────

/// Cluster-wide list of flunder names that may not be referenced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fischer {
    /// Standard metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Names no flunder may reference.
    #[serde(default)]
    pub disallowed_flunders: Vec<String>,
}

impl TypedObject for Fischer {
    const KIND: &'static str = "Fischer";
    object_meta_accessors!();
}

impl Resource for Fischer {
    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource::new(GROUP, "v1alpha1", "fischers")
    }

    fn namespace_scoped() -> bool {
        false
    }
}

impl Validator for Fischer {
    fn validate(&self) -> Vec<FieldError> {
        self.disallowed_flunders
            .iter()
            .enumerate()
            .filter(|(_, name)| name.is_empty())
            .map(|(i, _)| FieldError::new(format!("disallowedFlunders[{i}]"), "must not be empty"))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet
// ─────────────────────────────────────────────────────────────────────────────

/// Desired state of a [`Fleet`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSpec {
    /// Desired replica count.
    #[serde(default)]
    pub replicas: i32,
    /// Label selector of the fleet's members.
    #[serde(default)]
    pub selector: String,
    /// Image every member runs.
    #[serde(default)]
    pub image: String,
}

/// Observed state of a [`Fleet`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    /// Members reporting ready.
    #[serde(default)]
    pub ready: i32,
}

/// A scalable set of identical members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    /// Standard metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: FleetSpec,
    /// Observed state.
    #[serde(default)]
    pub status: FleetStatus,
}

impl TypedObject for Fleet {
    const KIND: &'static str = "Fleet";
    object_meta_accessors!();
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

/// The `fleets/logs` connector. Reports the parent fleet's desired replicas.
///
/// The `prefix` option is prepended to every line.
#[derive(Debug)]
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
            .ok_or_else(|| ApiError::Internal(format!("fleets/logs parent of {name} is not a Fleet")))?;
        let prefix = options
            .downcast_ref::<ConnectOptions>()
            .and_then(|options| options.params.get("prefix").cloned())
            .unwrap_or_default();

        Ok(Box::new(FleetLogStream {
            line: format!(
                "{prefix}{name}: {} of {} members ready running {}",
                fleet.status.ready, fleet.spec.replicas, fleet.spec.image
            ),
        }))
    }

    fn new_connect_options(&self) -> (Box<dyn Object>, bool, String) {
        (Box::new(ConnectOptions::default()), true, "path".into())
    }

    fn connect_methods(&self) -> Vec<String> {
        vec!["GET".into()]
    }
}

struct FleetLogStream {
    line: String,
}

#[async_trait]
impl ConnectHandler for FleetLogStream {
    async fn serve(&self, request: ConnectRequest) -> Result<ConnectResponse, ApiError> {
        if request.method != "GET" {
            return Err(ApiError::method_not_supported("fleets/logs", request.method));
        }
        Ok(ConnectResponse {
            status: 200,
            body: self.line.clone().into_bytes(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fortune
// ─────────────────────────────────────────────────────────────────────────────

/// A fortune, computed on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fortune {
    /// Standard metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The fortune.
    #[serde(default)]
    pub text: String,
}

impl TypedObject for Fortune {
    const KIND: &'static str = "Fortune";
    object_meta_accessors!();
}

impl Resource for Fortune {
    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource::new(GROUP, "v1alpha1", "fortunes")
    }

    fn namespace_scoped() -> bool {
        false
    }
}

const FORTUNES: &[&str] = &[
    "a quiet week ahead",
    "an unexpected reference resolves itself",
    "the scale tips in your favour",
];

/// Read-only fortunes. The text is picked by the name's length.
#[derive(Debug)]
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
            text: FORTUNES[name.len() % FORTUNES.len()].into(),
        }))
    }
}
