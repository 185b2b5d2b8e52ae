//! Provides the [`ResourceRegistry`] build state and the [`RouteTable`] and
//! [`Dispatcher`] globals.

use crate::dispatch::Dispatcher;
use crate::registry::ResourceRegistry;
use apiary_storage::config::StorageOptions;
use apiary_storage::plugin::StoragePlugin;
use apiary_system::plugin::{Plugin, PluginId};
use apiary_system::server::Server;
use std::sync::Arc;

/// Plugin that collects resource registrations and publishes the routes.
///
/// # Lifecycle
///
/// 1. **`build()` phase**: a mutable [`ResourceRegistry`] is inserted as
///    state. API group plugins depending on this one fetch it with
///    [`Server::get_state_mut`] and register their resources.
///
/// 2. **`ready()` phase**: the registry is removed and finalized against the
///    [`StorageOptions`] global. With eager initialization every provider is
///    constructed now.
///
/// # State Provided
///
/// | State | Scope | Description |
/// |-------|-------|-------------|
/// | [`ResourceRegistry`] | Build | Open for registration until `ready()` |
/// | [`RouteTable`](crate::route::RouteTable) | Global | Finalized routes |
/// | [`Dispatcher`] | Global | Serves requests from the routes |
///
/// # Panics
///
/// `ready()` panics with every collected error if a registration is
/// invalid, or if eager initialization fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryPlugin {
    eager: bool,
}

impl RegistryPlugin {
    /// Constructs every provider in `ready()` instead of on first request.
    #[must_use]
    pub fn with_eager_init(mut self) -> Self {
        self.eager = true;
        self
    }
}

impl Plugin for RegistryPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_state(ResourceRegistry::new());
    }

    fn ready(&self, server: &mut Server) {
        let registry = server
            .remove_state::<ResourceRegistry>()
            .expect("ResourceRegistry was removed before RegistryPlugin::ready");
        let options = server
            .get_global::<StorageOptions>()
            .map(|options| options.clone())
            .expect("StoragePlugin must be added before RegistryPlugin");

        let routes = match registry.finalize(Arc::new(options)) {
            Ok(routes) => routes,
            Err(errors) => panic!("resource registration failed: {errors}"),
        };
        if self.eager
            && let Err(errors) = routes.prepare()
        {
            panic!("storage initialization failed: {errors}");
        }

        server.insert_global(Dispatcher::new(routes.clone()));
        server.insert_global(routes);
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<StoragePlugin>()]
    }
}
