//! The generic scale view.

use crate::object::{ObjectMeta, TypedObject};
use crate::schema::{GroupVersion, GroupVersionKind};
use serde::{Deserialize, Serialize};

/// Group of the [`Scale`] kind.
pub const SCALE_GROUP: &str = "autoscaling";

/// Version of the [`Scale`] kind.
pub const SCALE_VERSION: &str = "v1";

/// Replica count and selector of any scalable resource.
///
/// Served at the `scale` subresource. The metadata mirrors the parent object
/// so clients can send the parent's `resourceVersion` back as a precondition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    /// Metadata copied from the parent object.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: ScaleSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ScaleStatus,
}

/// Desired replica count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleSpec {
    /// Desired number of replicas.
    #[serde(default)]
    pub replicas: i32,
}

/// Observed replica count and selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleStatus {
    /// Observed number of replicas.
    #[serde(default)]
    pub replicas: i32,
    /// Label selector in string form, e.g. `app=x`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
}

impl Scale {
    /// Creates a scale view.
    #[must_use]
    pub fn new(desired: i32, observed: i32, selector: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec: ScaleSpec { replicas: desired },
            status: ScaleStatus {
                replicas: observed,
                selector: selector.into(),
            },
        }
    }

    /// The group version the kind is served from.
    #[must_use]
    pub fn group_version() -> GroupVersion {
        GroupVersion::new(SCALE_GROUP, SCALE_VERSION)
    }

    /// The group version kind of [`Scale`].
    #[must_use]
    pub fn group_version_kind() -> GroupVersionKind {
        Self::group_version().with_kind(Self::KIND)
    }
}

impl TypedObject for Scale {
    const KIND: &'static str = "Scale";

    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
