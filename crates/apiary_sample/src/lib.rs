//! The `wardle.example.com` API group served by apiary.
//!
//! | Resource | Versions | Subresources | Storage |
//! |----------|----------|--------------|---------|
//! | `flunders` | `v1alpha1`, `v1beta1` | `status` | default store |
//! | `fischers` | `v1alpha1` | | default store, cluster scoped |
//! | `fleets` | `v1alpha1` | `status`, `scale`, `logs` | default store |
//! | `fortunes` | `v1alpha1` | | read-only handler |
//!
//! [`WardlePlugin`] registers all of them with the
//! [`ResourceRegistry`] during `build()`.

mod types;

pub use types::{
    Fischer, Fleet, FleetLogs, FleetSpec, FleetStatus, Flunder, FlunderSpec, FlunderStatus,
    FlunderV1beta1, Fortune, Fortunes, GROUP,
};

use apiary_builder::RegistryPlugin;
use apiary_builder::descriptor::{ArbitrarySubResource, ResourceDescriptor};
use apiary_builder::provider::static_handler;
use apiary_builder::registry::ResourceRegistry;
use apiary_storage::rest::ConnectOptions;
use apiary_system::plugin::{Plugin, PluginId};
use apiary_system::server::Server;
use std::sync::Arc;

/// Registers the wardle resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct WardlePlugin;

impl WardlePlugin {
    /// Adds every wardle resource to `registry`.
    pub fn register(registry: &mut ResourceRegistry) {
        registry
            .register(
                ResourceDescriptor::of::<Flunder>()
                    .with_status()
                    .with_defaulter()
                    .with_validator(),
            )
            .register(
                ResourceDescriptor::of::<FlunderV1beta1>()
                    .with_status()
                    .with_conversion::<Flunder>(),
            )
            .register(ResourceDescriptor::of::<Fischer>().with_validator())
            .register(
                ResourceDescriptor::of::<Fleet>()
                    .with_status()
                    .with_scale()
                    .with_subresource(ArbitrarySubResource::new::<ConnectOptions>(
                        "logs",
                        Arc::new(FleetLogs),
                    )),
            )
            .register_with_handler(
                ResourceDescriptor::of::<Fortune>(),
                static_handler(Arc::new(Fortunes)),
            );
    }
}

impl Plugin for WardlePlugin {
    fn build(&self, server: &mut Server) {
        let mut registry = server
            .get_state_mut::<ResourceRegistry>()
            .expect("RegistryPlugin must be added before WardlePlugin");
        Self::register(&mut registry);
        tracing::debug!(group = GROUP, "wardle resources registered");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<RegistryPlugin>()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_builder::route::RouteTable;
    use apiary_core::MinimalPlugins;
    use apiary_runtime::GroupVersionResource;
    use apiary_system::plugin::PluginGroup;

    #[test]
    fn registers_every_route() {
        let mut server = Server::new();
        server.add_plugins(MinimalPlugins.build());
        server.add_plugins(WardlePlugin);
        server.finish();

        let routes = server.get_global::<RouteTable>().unwrap();
        // flunders x2 with status, fischers, fleets with three subresources, fortunes.
        assert_eq!(routes.len(), 10);
        assert!(
            routes
                .route(&GroupVersionResource::new(GROUP, "v1alpha1", "fischers"))
                .is_some_and(|route| !route.namespace_scoped())
        );
        assert!(routes.prepare().is_ok());
    }

    #[tokio::test]
    async fn fleet_logs_follow_the_scale() {
        use apiary_builder::dispatch::{ApiRequest, Dispatcher};
        use apiary_storage::context::RequestContext;
        use apiary_storage::rest::ConnectRequest;
        use serde_json::json;

        let mut server = Server::new();
        server.add_plugins(MinimalPlugins.build());
        server.add_plugins(WardlePlugin);
        server.finish();
        let dispatcher = server.get_global::<Dispatcher>().unwrap().clone();
        let ctx = RequestContext::new();
        let fleets = |resource: &str| GroupVersionResource::new(GROUP, "v1alpha1", resource);

        let created = dispatcher
            .serve(
                &ctx,
                ApiRequest::create(
                    fleets("fleets"),
                    json!({ "metadata": { "name": "web" }, "spec": { "replicas": 2, "image": "web:1" } }),
                )
                .in_namespace("default"),
            )
            .await;
        assert_eq!(created.code, 201, "{}", created.body);

        let scaled = dispatcher
            .serve(
                &ctx,
                ApiRequest::patch(fleets("fleets/scale"), "web", json!({ "spec": { "replicas": 4 } }))
                    .in_namespace("default"),
            )
            .await;
        assert_eq!(scaled.code, 200, "{}", scaled.body);

        let logs = dispatcher
            .serve(
                &ctx,
                ApiRequest::connect(
                    fleets("fleets/logs"),
                    "web",
                    ConnectRequest {
                        method: "GET".into(),
                        ..ConnectRequest::default()
                    },
                )
                .in_namespace("default"),
            )
            .await;
        assert_eq!(logs.body, json!("web: 0 of 4 members ready running web:1"));
    }
}
