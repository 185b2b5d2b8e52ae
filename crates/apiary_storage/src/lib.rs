//! Storage handles, request context and the generic store for apiary.
//!
//! - [`rest`] - the [`Storage`](rest::Storage) handle and its capability traits
//! - [`request`] - per-call options and update payloads
//! - [`context`] - the [`RequestContext`](context::RequestContext) carrying parent bindings
//! - [`strategy`] - create/update hooks of the generic store
//! - [`store`] - the persistence-backed [`Store`](store::Store)
//! - [`backend`] - persistence engines
//! - [`config`] - storage configuration and the options source
//! - [`plugin`] - the [`StoragePlugin`](plugin::StoragePlugin)

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod plugin;
pub mod request;
pub mod rest;
pub mod store;
pub mod strategy;

pub use error::{ApiError, BackendError, FieldError, StorageError};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::backend::{Backend, JsonFileBackend, MemoryBackend};
    pub use crate::config::{BackendConfig, RestOptions, RestOptionsGetter, StorageConfig, StorageOptions};
    pub use crate::context::{ParentStorage, RequestContext};
    pub use crate::error::*;
    pub use crate::plugin::StoragePlugin;
    pub use crate::request::*;
    pub use crate::rest::*;
    pub use crate::store::{Store, StoreFn};
    pub use crate::strategy::{CopyStatusFn, DefaultStrategy, StatusStrategy, Strategy};
}
