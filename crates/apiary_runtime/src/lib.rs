//! Resource identities, object model and type scheme for apiary.
//!
//! - [`schema`] - group/version/resource and group/version/kind identities
//! - [`object`] - the [`Object`] trait and [`ObjectMeta`]
//! - [`scale`] - the generic [`Scale`] view
//! - [`scheme`] - the [`Scheme`] type registry with conversions and defaulting

pub mod object;
pub mod scale;
pub mod scheme;
pub mod schema;

pub use object::{Object, ObjectList, ObjectMeta, TypedObject, object_type_id};
pub use scale::{Scale, ScaleSpec, ScaleStatus};
pub use scheme::{Scheme, SchemeError};
pub use schema::{
    GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource, INTERNAL_VERSION,
};
