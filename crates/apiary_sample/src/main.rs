//! Serves a scripted session against the wardle API group.
//!
//! # Usage
//!
//! ```bash
//! wardle [storage-config.json]
//! ```
//!
//! The optional configuration selects the storage backend, e.g.
//! `{"backend": {"type": "jsonFile", "root": "/tmp/wardle"}}`. Without one,
//! objects live in memory.

use apiary_builder::RegistryPlugin;
use apiary_builder::dispatch::{ApiRequest, Dispatcher};
use apiary_core::TracingPlugin;
use apiary_runtime::GroupVersionResource;
use apiary_sample::{GROUP, WardlePlugin};
use apiary_storage::config::StorageConfig;
use apiary_storage::context::RequestContext;
use apiary_storage::plugin::StoragePlugin;
use apiary_storage::rest::ConnectRequest;
use apiary_system::plugin::PluginGroupBuilder;
use apiary_system::server::Server;
use serde_json::json;
use tracing::Level;

fn wardle(version: &str, resource: &str) -> GroupVersionResource {
    GroupVersionResource::new(GROUP, version, resource)
}

#[expect(clippy::print_stderr, reason = "tracing is not installed yet")]
fn storage_config() -> StorageConfig {
    let Some(path) = std::env::args().nth(1) else {
        return StorageConfig::default();
    };
    let loaded = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| StorageConfig::from_json(&json).map_err(|e| e.to_string()));
    loaded.unwrap_or_else(|e| {
        eprintln!("Error: cannot load storage config {path}: {e}");
        std::process::exit(1);
    })
}

fn session() -> Vec<ApiRequest> {
    vec![
        ApiRequest::create(
            wardle("v1alpha1", "flunders"),
            json!({ "metadata": { "name": "alpha" }, "spec": { "reference": "fischer-1" } }),
        ),
        ApiRequest::get(wardle("v1beta1", "flunders"), "alpha"),
        ApiRequest::update(
            wardle("v1beta1", "flunders/status"),
            "alpha",
            json!({ "metadata": { "name": "alpha" }, "target": "ignored", "phase": "Ready" }),
        ),
        ApiRequest::create(
            wardle("v1alpha1", "fischers"),
            json!({ "metadata": { "name": "fischer-1" }, "disallowedFlunders": ["beta"] }),
        ),
        ApiRequest::create(
            wardle("v1alpha1", "fleets"),
            json!({
                "metadata": { "name": "web" },
                "spec": { "replicas": 2, "selector": "app=web", "image": "web:1" },
            }),
        ),
        ApiRequest::patch(
            wardle("v1alpha1", "fleets/scale"),
            "web",
            json!({ "spec": { "replicas": 5 } }),
        ),
        ApiRequest::connect(
            wardle("v1alpha1", "fleets/logs"),
            "web",
            ConnectRequest {
                method: "GET".into(),
                ..ConnectRequest::default()
            },
        )
        .with_connect_options(json!({ "params": { "prefix": "> " } })),
        ApiRequest::get(wardle("v1alpha1", "fortunes"), "today"),
        ApiRequest::delete(wardle("v1alpha1", "fortunes"), "today"),
        ApiRequest::list(wardle("v1alpha1", "flunders")),
    ]
}

#[tokio::main]
async fn main() {
    let config = storage_config();

    let mut server = Server::new();
    server.add_plugins(
        PluginGroupBuilder::new()
            .add(TracingPlugin::default().with_level(Level::DEBUG))
            .add(StoragePlugin::new(config))
            .add(RegistryPlugin::default().with_eager_init()),
    );
    server.add_plugins(WardlePlugin);
    server.finish();

    let Some(dispatcher) = server.get_global::<Dispatcher>().map(|d| d.clone()) else {
        tracing::error!("no dispatcher installed");
        return;
    };

    let ctx = RequestContext::new();
    for request in session() {
        let verb = request.verb();
        let resource = request.resource().to_string();
        let response = dispatcher.serve(&ctx, request.in_namespace("default")).await;
        if response.is_success() {
            tracing::info!(%verb, %resource, code = response.code, body = %response.body, "served");
        } else {
            tracing::warn!(%verb, %resource, code = response.code, body = %response.body, "rejected");
        }
    }

    server.cleanup();
}
