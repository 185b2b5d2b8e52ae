//! The object model.
//!
//! Storage handles move objects around as `Box<dyn Object>`. Resource authors
//! never implement [`Object`] directly: they implement [`TypedObject`] on a
//! serde type and get [`Object`] through the blanket impl.
//!
//! ```
//! use apiary_runtime::{Object, ObjectMeta, TypedObject};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Fortune {
//!     #[serde(default)]
//!     metadata: ObjectMeta,
//!     #[serde(default)]
//!     value: String,
//! }
//!
//! impl TypedObject for Fortune {
//!     const KIND: &'static str = "Fortune";
//!     fn object_meta(&self) -> &ObjectMeta { &self.metadata }
//!     fn object_meta_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
//! }
//!
//! let boxed: Box<dyn Object> = Box::new(Fortune::default());
//! assert_eq!(boxed.kind(), "Fortune");
//! assert!(boxed.downcast_ref::<Fortune>().is_some());
//! ```

use core::any::TypeId;
use core::fmt;
use downcast_rs::{DowncastSync, impl_downcast};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// ObjectMeta
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata every stored object carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name, unique within a namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace, empty for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Identity assigned at creation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Opaque version token used for optimistic concurrency.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Incremented whenever the non-metadata, non-status part changes.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub generation: i64,
    /// Key/value labels used by list selectors.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl ObjectMeta {
    /// Metadata for a cluster-scoped object.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata for a namespaced object.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Object
// ─────────────────────────────────────────────────────────────────────────────

/// A type-erased API object.
pub trait Object: DowncastSync + fmt::Debug {
    /// The kind name of this object's type.
    fn kind(&self) -> &'static str;

    /// Object metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Mutable object metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Deep copy behind a fresh box.
    fn clone_object(&self) -> Box<dyn Object>;

    /// Serializes the object to JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the object cannot be represented as JSON.
    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Replaces this object with the decoded `value`.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if `value` does not match the type.
    fn load_value(&mut self, value: serde_json::Value) -> Result<(), serde_json::Error>;
}

impl_downcast!(sync Object);

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self {
        self.clone_object()
    }
}

/// The author-facing side of [`Object`].
pub trait TypedObject:
    Clone + Default + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    /// Kind name, unique within a group version.
    const KIND: &'static str;

    /// Object metadata.
    fn object_meta(&self) -> &ObjectMeta;

    /// Mutable object metadata.
    fn object_meta_mut(&mut self) -> &mut ObjectMeta;
}

impl<T: TypedObject> Object for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn meta(&self) -> &ObjectMeta {
        self.object_meta()
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        self.object_meta_mut()
    }

    fn clone_object(&self) -> Box<dyn Object> {
        Box::new(self.clone())
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn load_value(&mut self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Returns the [`TypeId`] of the concrete type behind `obj`.
#[must_use]
pub fn object_type_id(obj: &dyn Object) -> TypeId {
    obj.as_any().type_id()
}

// ─────────────────────────────────────────────────────────────────────────────
// ObjectList
// ─────────────────────────────────────────────────────────────────────────────

/// The result of a list call.
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    /// List kind, e.g. `FlunderList`.
    pub kind: String,
    /// Store revision the list was read at.
    pub resource_version: String,
    /// The listed objects.
    pub items: Vec<Box<dyn Object>>,
}

impl ObjectList {
    /// Creates an empty list of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Serializes the list to JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error of the first item that fails.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let items = self
            .items
            .iter()
            .map(|item| item.to_value())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::json!({
            "kind": self.kind,
            "metadata": { "resourceVersion": self.resource_version },
            "items": items,
        }))
    }
}
