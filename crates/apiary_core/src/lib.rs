//! Core infrastructure plugins for apiary.
//!
//! - [`TracingPlugin`] - Logging and observability via the `tracing` crate
//! - [`DefaultPlugins`] - Tracing, storage and the resource registry in one group
//!
//! # Example
//!
//! ```
//! use apiary_builder::route::RouteTable;
//! use apiary_core::DefaultPlugins;
//! use apiary_system::plugin::PluginGroup;
//! use apiary_system::server::Server;
//!
//! let mut server = Server::new();
//! server.add_plugins(DefaultPlugins.build());
//! server.finish();
//!
//! assert!(server.contains_global::<RouteTable>());
//! ```
//!
//! API group plugins declare a dependency on
//! [`RegistryPlugin`](apiary_builder::RegistryPlugin) and register their
//! resources in `build()`.

mod tracing_plugin;

pub use tracing_plugin::{TracingConfig, TracingFormat, TracingPlugin};

use apiary_builder::RegistryPlugin;
use apiary_storage::plugin::StoragePlugin;
use apiary_system::plugin::{PluginGroup, PluginGroupBuilder};

/// Default plugins for an apiary server.
///
/// Includes:
/// - [`TracingPlugin`] - Logging and observability
/// - [`StoragePlugin`] - In-memory storage under `/registry`
/// - [`RegistryPlugin`] - Resource registration and routing
///
/// # Customization
///
/// ```
/// use apiary_builder::RegistryPlugin;
/// use apiary_core::{DefaultPlugins, TracingPlugin};
/// use apiary_system::plugin::PluginGroup;
/// use apiary_system::server::Server;
///
/// let mut server = Server::new();
/// server.add_plugins(
///     DefaultPlugins
///         .build()
///         .disable::<TracingPlugin>()
///         .disable::<RegistryPlugin>()
///         .add(RegistryPlugin::default().with_eager_init()),
/// );
/// server.finish();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(TracingPlugin::default())
            .add(StoragePlugin::default())
            .add(RegistryPlugin::default())
    }
}

/// Storage and the resource registry without tracing, for tests that do not
/// need logging output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalPlugins;

impl PluginGroup for MinimalPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(StoragePlugin::default())
            .add(RegistryPlugin::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_builder::dispatch::Dispatcher;
    use apiary_storage::config::StorageOptions;
    use apiary_system::server::Server;

    #[test]
    fn default_plugins_builds() {
        assert_eq!(DefaultPlugins.build().len(), 3);
        assert_eq!(MinimalPlugins.build().len(), 2);
    }

    #[test]
    fn server_with_minimal_plugins() {
        let mut server = Server::new();
        server.add_plugins(MinimalPlugins.build());
        server.finish();

        assert!(server.contains_global::<StorageOptions>());
        assert!(server.contains_global::<Dispatcher>());
        assert!(!server.contains_global::<TracingConfig>());
    }
}
