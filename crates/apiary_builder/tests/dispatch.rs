//! Requests served through the dispatcher, across versions and subresources.

mod common;

use apiary_builder::descriptor::{ArbitrarySubResource, ResourceDescriptor};
use apiary_builder::dispatch::{ApiRequest, ApiResponse, Dispatcher};
use apiary_builder::provider::static_handler;
use apiary_builder::registry::ResourceRegistry;
use apiary_runtime::GroupVersionResource;
use apiary_storage::context::RequestContext;
use apiary_storage::rest::{ConnectOptions, ConnectRequest};
use common::{Fleet, FleetLogs, Flunder, FlunderV1beta1, Fortune, Fortunes, GROUP, finalize};
use serde_json::json;
use std::sync::Arc;

fn wardle(version: &str, resource: &str) -> GroupVersionResource {
    GroupVersionResource::new(GROUP, version, resource)
}

fn dispatcher() -> Dispatcher {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>().with_status().with_validator())
        .register(
            ResourceDescriptor::of::<FlunderV1beta1>()
                .with_status()
                .with_conversion::<Flunder>(),
        )
        .register(
            ResourceDescriptor::of::<Fleet>()
                .with_status()
                .with_scale()
                .with_subresource(ArbitrarySubResource::new::<ConnectOptions>("logs", Arc::new(FleetLogs))),
        )
        .register_with_handler(
            ResourceDescriptor::of::<Fortune>().with_status(),
            static_handler(Arc::new(Fortunes)),
        )
        .register_subresource(wardle("v1alpha1", "fortunes"), "status");
    Dispatcher::new(finalize(registry))
}

async fn serve(dispatcher: &Dispatcher, request: ApiRequest) -> ApiResponse {
    dispatcher
        .serve(&RequestContext::new(), request.in_namespace("default"))
        .await
}

#[tokio::test]
async fn versions_convert_through_one_store() {
    let dispatcher = dispatcher();

    let created = serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1beta1", "flunders"),
            json!({
                "apiVersion": "wardle.example.com/v1beta1",
                "kind": "Flunder",
                "metadata": { "name": "alpha" },
                "target": "ref-1",
            }),
        ),
    )
    .await;
    assert_eq!(created.code, 201, "{}", created.body);
    assert_eq!(created.body["apiVersion"], "wardle.example.com/v1beta1");
    assert_eq!(created.body["target"], "ref-1");

    let fetched = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "flunders"), "alpha")).await;
    assert_eq!(fetched.code, 200);
    assert_eq!(fetched.body["kind"], "Flunder");
    assert_eq!(fetched.body["spec"]["reference"], "ref-1");
    assert_eq!(fetched.body["metadata"]["uid"], created.body["metadata"]["uid"]);

    let listed = serve(&dispatcher, ApiRequest::list(wardle("v1beta1", "flunders"))).await;
    assert_eq!(listed.body["kind"], "FlunderList");
    assert_eq!(listed.body["items"][0]["target"], "ref-1");
}

#[tokio::test]
async fn patch_applies_in_the_requested_version() {
    let dispatcher = dispatcher();
    serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1alpha1", "flunders"),
            json!({ "metadata": { "name": "alpha" }, "spec": { "reference": "ref-1" } }),
        ),
    )
    .await;

    let patched = serve(
        &dispatcher,
        ApiRequest::patch(wardle("v1beta1", "flunders"), "alpha", json!({ "target": "ref-2" })),
    )
    .await;
    assert_eq!(patched.code, 200, "{}", patched.body);
    assert_eq!(patched.body["target"], "ref-2");

    let fetched = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "flunders"), "alpha")).await;
    assert_eq!(fetched.body["spec"]["reference"], "ref-2");
}

#[tokio::test]
async fn status_route_ignores_spec_changes() {
    let dispatcher = dispatcher();
    let created = serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1alpha1", "flunders"),
            json!({ "metadata": { "name": "alpha" }, "spec": { "reference": "ref-1" } }),
        ),
    )
    .await;

    let mut body = created.body.clone();
    body["spec"]["reference"] = json!("ref-2");
    body["status"]["phase"] = json!("Ready");
    let updated = serve(
        &dispatcher,
        ApiRequest::update(wardle("v1alpha1", "flunders/status"), "alpha", body),
    )
    .await;
    assert_eq!(updated.code, 200, "{}", updated.body);
    assert_eq!(updated.body["spec"]["reference"], "ref-1");
    assert_eq!(updated.body["status"]["phase"], "Ready");

    let beta = serve(&dispatcher, ApiRequest::get(wardle("v1beta1", "flunders/status"), "alpha")).await;
    assert_eq!(beta.body["apiVersion"], "wardle.example.com/v1beta1");
    assert_eq!(beta.body["phase"], "Ready");
}

#[tokio::test]
async fn scale_is_served_as_autoscaling_scale() {
    let dispatcher = dispatcher();
    serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1alpha1", "fleets"),
            json!({ "metadata": { "name": "web" }, "spec": { "replicas": 2, "selector": "app=web" } }),
        ),
    )
    .await;

    let scale = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "fleets/scale"), "web")).await;
    assert_eq!(scale.code, 200, "{}", scale.body);
    assert_eq!(scale.body["apiVersion"], "autoscaling/v1");
    assert_eq!(scale.body["kind"], "Scale");
    assert_eq!(scale.body["spec"]["replicas"], 2);

    let patched = serve(
        &dispatcher,
        ApiRequest::patch(
            wardle("v1alpha1", "fleets/scale"),
            "web",
            json!({ "spec": { "replicas": 6 } }),
        ),
    )
    .await;
    assert_eq!(patched.code, 200, "{}", patched.body);
    let fleet = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "fleets"), "web")).await;
    assert_eq!(fleet.body["spec"]["replicas"], 6);
    assert_eq!(fleet.body["spec"]["selector"], "app=web");
}

#[tokio::test]
async fn connect_streams_from_the_subresource() {
    let dispatcher = dispatcher();
    serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1alpha1", "fleets"),
            json!({ "metadata": { "name": "web" }, "spec": { "replicas": 3 } }),
        ),
    )
    .await;

    let reply = serve(
        &dispatcher,
        ApiRequest::connect(
            wardle("v1alpha1", "fleets/logs"),
            "web",
            ConnectRequest {
                method: "GET".into(),
                ..ConnectRequest::default()
            },
        )
        .with_connect_options(json!({ "params": { "tail": "!" } })),
    )
    .await;
    assert_eq!(reply.code, 200);
    assert_eq!(reply.body, json!("GET web: 3 replicas!"));
}

#[tokio::test]
async fn failures_map_to_status_codes() {
    let dispatcher = dispatcher();

    let missing = serve(&dispatcher, ApiRequest::get(wardle("v1", "widgets"), "a")).await;
    assert_eq!(missing.code, 404);

    let read_only = serve(&dispatcher, ApiRequest::delete(wardle("v1alpha1", "fortunes"), "today")).await;
    assert_eq!(read_only.code, 405);
    assert_eq!(read_only.body["reason"], "MethodNotAllowed");

    let fortune = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "fortunes"), "today")).await;
    assert_eq!(fortune.code, 200);
    assert_eq!(fortune.body["text"], "a quiet week ahead");

    let unavailable = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "fortunes/status"), "today")).await;
    assert_eq!(unavailable.code, 503);

    let invalid = serve(
        &dispatcher,
        ApiRequest::create(wardle("v1alpha1", "flunders"), json!({ "metadata": { "name": "empty" } })),
    )
    .await;
    assert_eq!(invalid.code, 422);

    let malformed = serve(
        &dispatcher,
        ApiRequest::create(wardle("v1alpha1", "flunders"), json!({ "spec": "not an object" })),
    )
    .await;
    assert_eq!(malformed.code, 400);
}

#[tokio::test]
async fn dry_run_persists_nothing() {
    let dispatcher = dispatcher();
    let created = serve(
        &dispatcher,
        ApiRequest::create(
            wardle("v1alpha1", "flunders"),
            json!({ "metadata": { "name": "alpha" }, "spec": { "reference": "ref-1" } }),
        )
        .dry_run(),
    )
    .await;
    assert_eq!(created.code, 201);

    let fetched = serve(&dispatcher, ApiRequest::get(wardle("v1alpha1", "flunders"), "alpha")).await;
    assert_eq!(fetched.code, 404);
}
