//! # Apiary Internal Library
//!
//! Re-exports the apiary crates for convenience.

/// Plugin lifecycle and typed server state.
pub use apiary_system;

/// Resource identities, objects and the type registry.
pub use apiary_runtime;

/// Storage capabilities, the generic store and backends.
pub use apiary_storage;

/// Resource registration and subresource composition.
pub use apiary_builder;

/// Infrastructure plugins.
pub use apiary_core;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use apiary_builder::prelude::*;
    pub use apiary_core::{DefaultPlugins, MinimalPlugins, TracingConfig, TracingFormat, TracingPlugin};
    pub use apiary_runtime::{
        GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource, Object, ObjectList,
        ObjectMeta, Scale, Scheme, SchemeError, TypedObject,
    };
    pub use apiary_storage::prelude::*;
    pub use apiary_system::prelude::*;
}
