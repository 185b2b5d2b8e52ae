//! The type registry.
//!
//! A [`Scheme`] knows which Rust type serves each group/version/kind, how to
//! convert between the types of different versions of a resource, how to
//! default them, and in what order the versions of a group are preferred.
//!
//! It is written once while resources are registered and shared read-only
//! afterwards.

use crate::object::{Object, TypedObject, object_type_id};
use crate::schema::{GroupVersion, GroupVersionKind};
use core::any::TypeId;
use hashbrown::HashMap;
use std::sync::Arc;

/// Errors returned by the [`Scheme`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemeError {
    /// No type is registered for the kind.
    #[error("no kind {0} is registered")]
    NotRegistered(GroupVersionKind),

    /// The type was never registered under any kind.
    #[error("type {0} is not registered with the scheme")]
    UnregisteredType(&'static str),

    /// A kind is registered twice with different types.
    #[error("kind {gvk} is already registered to {existing}, cannot register {new}")]
    KindConflict {
        /// The contested kind.
        gvk: GroupVersionKind,
        /// Type already registered.
        existing: &'static str,
        /// Type that was rejected.
        new: &'static str,
    },

    /// No conversion function links the two types.
    #[error("converting {from} to {to} is not supported")]
    MissingConversion {
        /// Source kind.
        from: &'static str,
        /// Target kind.
        to: String,
    },

    /// A conversion function rejected its input.
    #[error("converting {from} to {to} failed: {message}")]
    Conversion {
        /// Source kind.
        from: &'static str,
        /// Target kind.
        to: String,
        /// The conversion's error.
        message: String,
    },

    /// A JSON document did not decode into the registered type.
    #[error("decoding {gvk} failed: {message}")]
    Decode {
        /// The kind being decoded.
        gvk: GroupVersionKind,
        /// The deserializer's error.
        message: String,
    },

    /// A version priority list spans more than one group.
    #[error("version priority for {group} includes {other}")]
    MixedGroups {
        /// The group being prioritized.
        group: String,
        /// The offending group version.
        other: GroupVersion,
    },
}

type ConvertFn = Arc<dyn Fn(&dyn Object) -> Result<Box<dyn Object>, String> + Send + Sync>;
type DefaultFn = Arc<dyn Fn(&mut dyn Object) + Send + Sync>;

#[derive(Clone, Copy)]
struct KnownType {
    type_id: TypeId,
    type_name: &'static str,
    new_fn: fn() -> Box<dyn Object>,
}

fn new_boxed<T: TypedObject>() -> Box<dyn Object> {
    Box::new(T::default())
}

/// Registry of object types, conversions and defaulters.
#[derive(Default, Clone)]
pub struct Scheme {
    known_types: HashMap<GroupVersionKind, KnownType>,
    kinds_by_type: HashMap<TypeId, Vec<GroupVersionKind>>,
    conversions: HashMap<(TypeId, TypeId), ConvertFn>,
    defaulters: HashMap<TypeId, Vec<DefaultFn>>,
    version_priority: HashMap<String, Vec<String>>,
}

impl core::fmt::Debug for Scheme {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kinds: Vec<String> = self.known_types.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("Scheme")
            .field("kinds", &kinds)
            .field("conversions", &self.conversions.len())
            .finish_non_exhaustive()
    }
}

impl Scheme {
    /// Creates an empty scheme.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Kinds
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers `T` under `gv` with its own kind name.
    ///
    /// Registering the same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KindConflict`] if the kind is taken by another type.
    pub fn add_known_type<T: TypedObject>(&mut self, gv: &GroupVersion) -> Result<(), SchemeError> {
        let gvk = gv.with_kind(T::KIND);
        let known = KnownType {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            new_fn: new_boxed::<T>,
        };

        if let Some(existing) = self.known_types.get(&gvk) {
            if existing.type_id == known.type_id {
                return Ok(());
            }
            return Err(SchemeError::KindConflict {
                gvk,
                existing: existing.type_name,
                new: known.type_name,
            });
        }

        tracing::trace!(kind = %gvk, type_name = known.type_name, "registered kind");
        self.kinds_by_type
            .entry(known.type_id)
            .or_default()
            .push(gvk.clone());
        self.known_types.insert(gvk, known);
        Ok(())
    }

    /// Returns `true` if the kind is registered.
    #[must_use]
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.known_types.contains_key(gvk)
    }

    /// Returns every registered kind.
    pub fn known_kinds(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.known_types.keys()
    }

    /// Creates an empty object of the kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] for unknown kinds.
    pub fn new_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>, SchemeError> {
        self.known_type(gvk).map(|known| (known.new_fn)())
    }

    /// Decodes a JSON document as the kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] for unknown kinds and
    /// [`SchemeError::Decode`] when the document does not fit the type.
    pub fn decode(
        &self,
        gvk: &GroupVersionKind,
        value: serde_json::Value,
    ) -> Result<Box<dyn Object>, SchemeError> {
        let mut obj = self.new_object(gvk)?;
        obj.load_value(value).map_err(|e| SchemeError::Decode {
            gvk: gvk.clone(),
            message: e.to_string(),
        })?;
        Ok(obj)
    }

    /// Returns the kinds the object's type is registered under.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::UnregisteredType`] if the type is unknown.
    pub fn object_kinds(&self, obj: &dyn Object) -> Result<&[GroupVersionKind], SchemeError> {
        self.kinds_by_type
            .get(&object_type_id(obj))
            .map(Vec::as_slice)
            .ok_or(SchemeError::UnregisteredType(obj.kind()))
    }

    /// Returns the type registered for the kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] for unknown kinds.
    pub fn type_id_of(&self, gvk: &GroupVersionKind) -> Result<TypeId, SchemeError> {
        self.known_type(gvk).map(|known| known.type_id)
    }

    fn known_type(&self, gvk: &GroupVersionKind) -> Result<&KnownType, SchemeError> {
        self.known_types
            .get(gvk)
            .ok_or_else(|| SchemeError::NotRegistered(gvk.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversion
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a one-way conversion from `A` to `B`.
    pub fn add_conversion<A, B, F>(&mut self, convert: F)
    where
        A: TypedObject,
        B: TypedObject,
        F: Fn(&A) -> Result<B, String> + Send + Sync + 'static,
    {
        let erased: ConvertFn = Arc::new(move |obj: &dyn Object| {
            let source = obj
                .downcast_ref::<A>()
                .ok_or_else(|| format!("expected {}, got {}", A::KIND, obj.kind()))?;
            convert(source).map(|target| Box::new(target) as Box<dyn Object>)
        });
        self.conversions
            .insert((TypeId::of::<A>(), TypeId::of::<B>()), erased);
    }

    /// Returns `true` if `A` converts to `B`.
    #[must_use]
    pub fn converts<A: TypedObject, B: TypedObject>(&self) -> bool {
        TypeId::of::<A>() == TypeId::of::<B>()
            || self
                .conversions
                .contains_key(&(TypeId::of::<A>(), TypeId::of::<B>()))
    }

    /// Converts `obj` into the type registered for `target`.
    ///
    /// Objects that already have the target type are copied unchanged.
    ///
    /// # Errors
    ///
    /// - [`SchemeError::NotRegistered`] if `target` is unknown
    /// - [`SchemeError::MissingConversion`] if no conversion links the types
    /// - [`SchemeError::Conversion`] if the conversion rejects the object
    pub fn convert(
        &self,
        obj: &dyn Object,
        target: &GroupVersionKind,
    ) -> Result<Box<dyn Object>, SchemeError> {
        let target_type = self.type_id_of(target)?;
        let source_type = object_type_id(obj);
        if source_type == target_type {
            return Ok(obj.clone_object());
        }

        let convert = self
            .conversions
            .get(&(source_type, target_type))
            .ok_or_else(|| SchemeError::MissingConversion {
                from: obj.kind(),
                to: target.to_string(),
            })?;
        convert(obj).map_err(|message| SchemeError::Conversion {
            from: obj.kind(),
            to: target.to_string(),
            message,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Defaulting
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a defaulting function for `T`.
    pub fn add_defaulter<T, F>(&mut self, default: F)
    where
        T: TypedObject,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let erased: DefaultFn = Arc::new(move |obj: &mut dyn Object| {
            if let Some(typed) = obj.downcast_mut::<T>() {
                default(typed);
            }
        });
        self.defaulters
            .entry(TypeId::of::<T>())
            .or_default()
            .push(erased);
    }

    /// Applies every defaulter registered for the object's type.
    pub fn apply_defaults(&self, obj: &mut dyn Object) {
        if let Some(defaulters) = self.defaulters.get(&object_type_id(obj)) {
            for default in defaulters {
                default(obj);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Version priority
    // ─────────────────────────────────────────────────────────────────────────

    /// Sets the preferred order of the versions of one group.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::MixedGroups`] if the versions span several groups.
    pub fn set_version_priority(&mut self, versions: &[GroupVersion]) -> Result<(), SchemeError> {
        let Some(first) = versions.first() else {
            return Ok(());
        };
        if let Some(other) = versions.iter().find(|gv| gv.group != first.group) {
            return Err(SchemeError::MixedGroups {
                group: first.group.clone(),
                other: other.clone(),
            });
        }
        self.version_priority.insert(
            first.group.clone(),
            versions.iter().map(|gv| gv.version.clone()).collect(),
        );
        Ok(())
    }

    /// Returns the versions of `group` in preferred order.
    #[must_use]
    pub fn prioritized_versions_for_group(&self, group: &str) -> Vec<GroupVersion> {
        self.version_priority
            .get(group)
            .map(|versions| {
                versions
                    .iter()
                    .map(|version| GroupVersion::new(group, version.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectMeta;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct FlunderV1 {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        reference: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct FlunderV2 {
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        references: Vec<String>,
    }

    impl TypedObject for FlunderV1 {
        const KIND: &'static str = "Flunder";
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    impl TypedObject for FlunderV2 {
        const KIND: &'static str = "Flunder";
        fn object_meta(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn object_meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    fn v1() -> GroupVersion {
        GroupVersion::new("wardle.example.com", "v1alpha1")
    }

    fn v2() -> GroupVersion {
        GroupVersion::new("wardle.example.com", "v1beta1")
    }

    fn scheme() -> Scheme {
        let mut scheme = Scheme::new();
        scheme.add_known_type::<FlunderV1>(&v1()).unwrap();
        scheme.add_known_type::<FlunderV1>(&v1().internal()).unwrap();
        scheme.add_known_type::<FlunderV2>(&v2()).unwrap();
        scheme.add_conversion::<FlunderV2, FlunderV1, _>(|v2| {
            Ok(FlunderV1 {
                metadata: v2.metadata.clone(),
                reference: v2.references.first().cloned().unwrap_or_default(),
            })
        });
        scheme.add_conversion::<FlunderV1, FlunderV2, _>(|v1| {
            Ok(FlunderV2 {
                metadata: v1.metadata.clone(),
                references: vec![v1.reference.clone()],
            })
        });
        scheme
    }

    #[test]
    fn kinds_and_decode() {
        let scheme = scheme();
        let gvk = v2().with_kind("Flunder");
        assert!(scheme.recognizes(&gvk));

        let obj = scheme
            .decode(&gvk, serde_json::json!({ "references": ["a", "b"] }))
            .unwrap();
        assert_eq!(obj.downcast_ref::<FlunderV2>().unwrap().references.len(), 2);
        assert_eq!(scheme.object_kinds(obj.as_ref()).unwrap(), &[gvk]);

        let storage_kinds = scheme.object_kinds(&FlunderV1::default()).unwrap();
        assert_eq!(storage_kinds.len(), 2);
    }

    #[test]
    fn decode_errors() {
        let scheme = scheme();
        let unknown = v2().with_kind("Fortune");
        assert_eq!(
            scheme.new_object(&unknown).unwrap_err(),
            SchemeError::NotRegistered(unknown)
        );
        let bad = scheme.decode(&v2().with_kind("Flunder"), serde_json::json!({ "references": 4 }));
        assert!(matches!(bad, Err(SchemeError::Decode { .. })));
    }

    #[test]
    fn kind_conflict_is_rejected() {
        let mut scheme = scheme();
        let err = scheme.add_known_type::<FlunderV2>(&v1()).unwrap_err();
        assert!(matches!(err, SchemeError::KindConflict { .. }));
    }

    #[test]
    fn convert_between_versions() {
        let scheme = scheme();
        let external = FlunderV2 {
            metadata: ObjectMeta::named("a"),
            references: vec!["x".into()],
        };

        let internal = scheme
            .convert(&external, &v1().internal().with_kind("Flunder"))
            .unwrap();
        assert_eq!(internal.downcast_ref::<FlunderV1>().unwrap().reference, "x");

        let identity = scheme.convert(internal.as_ref(), &v1().with_kind("Flunder")).unwrap();
        assert_eq!(identity.meta().name, "a");
        assert!(scheme.converts::<FlunderV1, FlunderV2>());
    }

    #[test]
    fn missing_conversion() {
        let mut scheme = Scheme::new();
        scheme.add_known_type::<FlunderV1>(&v1()).unwrap();
        scheme.add_known_type::<FlunderV2>(&v2()).unwrap();

        let err = scheme
            .convert(&FlunderV2::default(), &v1().with_kind("Flunder"))
            .unwrap_err();
        assert!(matches!(err, SchemeError::MissingConversion { .. }));
    }

    #[test]
    fn defaulters_apply_by_type() {
        let mut scheme = scheme();
        scheme.add_defaulter::<FlunderV1, _>(|f| {
            if f.reference.is_empty() {
                f.reference = "default".into();
            }
        });

        let mut v1 = FlunderV1::default();
        scheme.apply_defaults(&mut v1);
        assert_eq!(v1.reference, "default");

        let mut v2 = FlunderV2::default();
        scheme.apply_defaults(&mut v2);
        assert!(v2.references.is_empty());
    }

    #[test]
    fn version_priority() {
        let mut scheme = Scheme::new();
        scheme.set_version_priority(&[v1(), v2()]).unwrap();
        assert_eq!(
            scheme.prioritized_versions_for_group("wardle.example.com"),
            vec![v1(), v2()]
        );

        let err = scheme
            .set_version_priority(&[v1(), GroupVersion::new("apps", "v1")])
            .unwrap_err();
        assert!(matches!(err, SchemeError::MixedGroups { .. }));
        assert!(scheme.prioritized_versions_for_group("apps").is_empty());
    }
}
