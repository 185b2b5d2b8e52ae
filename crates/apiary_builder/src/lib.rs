//! Resource registration and storage composition for apiary.
//!
//! API groups describe their resources with a
//! [`ResourceDescriptor`](descriptor::ResourceDescriptor) and register them
//! against the [`ResourceRegistry`](registry::ResourceRegistry). The registry
//! shares one lazily built storage handle between every version of a
//! resource, composes subresources over their parent's handle, and finalizes
//! into a [`RouteTable`](route::RouteTable) served by the
//! [`Dispatcher`](dispatch::Dispatcher).
//!
//! - [`descriptor`] - resource traits and their type-erased descriptor
//! - [`provider`] - storage providers and the [`SingletonProvider`](provider::SingletonProvider)
//! - [`subresource`] - adapter shapes of subresources
//! - [`scale`] - the generic scale view
//! - [`registry`] - registration and finalize
//! - [`route`] - the finalized route table
//! - [`dispatch`] - request dispatch
//!
//! # Example
//!
//! ```
//! use apiary_builder::prelude::*;
//! use apiary_storage::prelude::*;
//! use apiary_system::server::Server;
//!
//! let mut server = Server::new();
//! server.add_plugins(StoragePlugin::default());
//! server.add_plugins(RegistryPlugin::default().with_eager_init());
//! server.finish();
//!
//! assert!(server.get_global::<RouteTable>().is_some());
//! ```

pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod plugin;
pub mod provider;
pub mod registry;
pub mod route;
pub mod scale;
pub mod subresource;

pub use error::{AggregateError, ConfigError, RegistryError};
pub use plugin::RegistryPlugin;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::descriptor::{
        ArbitrarySubResource, Defaulter, DescriptorBuilder, HasScale, HasStatus, MultiVersion,
        Resource, ResourceDescriptor, SubResourceSource, Validator,
    };
    pub use crate::dispatch::{ApiRequest, ApiResponse, Dispatcher, Verb};
    pub use crate::error::{AggregateError, ConfigError, RegistryError};
    pub use crate::plugin::RegistryPlugin;
    pub use crate::provider::{SingletonProvider, StorageProvider, static_handler};
    pub use crate::registry::ResourceRegistry;
    pub use crate::route::{Route, RouteTable};
    pub use crate::scale::{ScaleFns, ScaleStorage};
    pub use crate::subresource::AdapterKind;
}
