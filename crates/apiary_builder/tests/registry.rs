//! Registration order, rejection and the finalized route table.

mod common;

use apiary_builder::descriptor::{ArbitrarySubResource, ResourceDescriptor};
use apiary_builder::error::{ConfigError, RegistryError};
use apiary_builder::provider::static_handler;
use apiary_builder::registry::ResourceRegistry;
use apiary_builder::subresource::AdapterKind;
use apiary_runtime::{GroupResource, GroupVersion, GroupVersionResource, Scale};
use apiary_storage::rest::ConnectOptions;
use common::{
    Fleet, FleetLogs, Flunder, FlunderV1beta1, Fortune, Fortunes, GROUP, ParentEcho, finalize, options,
};
use std::sync::Arc;

fn flunders(version: &str) -> GroupVersionResource {
    GroupVersionResource::new(GROUP, version, "flunders")
}

fn config_errors(registry: ResourceRegistry) -> Vec<ConfigError> {
    registry
        .finalize(options())
        .unwrap_err()
        .into_errors()
        .into_iter()
        .map(|error| match error {
            RegistryError::Config(error) => error,
            other => panic!("unexpected error: {other}"),
        })
        .collect()
}

#[test]
fn subresource_before_parent_is_rejected() {
    let mut registry = ResourceRegistry::new();
    registry.register_subresource_with_handler(
        flunders("v1alpha1"),
        ArbitrarySubResource::parent_shaped("history", Arc::new(ParentEcho::default())),
    );
    assert!(!registry.is_registered(&flunders("v1alpha1").with_subresource("history")));

    registry.register(ResourceDescriptor::of::<Flunder>());
    assert!(!registry.is_registered(&flunders("v1alpha1").with_subresource("history")));

    let errors = config_errors(registry);
    assert_eq!(
        errors,
        vec![ConfigError::ParentNotRegistered {
            parent: flunders("v1alpha1"),
            path: "history".into(),
        }]
    );
}

#[test]
fn version_without_conversion_is_rejected() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>())
        .register(ResourceDescriptor::of::<FlunderV1beta1>());

    assert!(!registry.is_registered(&flunders("v1beta1")));
    assert_eq!(
        config_errors(registry),
        vec![ConfigError::MissingConverter {
            resource: flunders("v1beta1"),
        }]
    );
}

#[test]
fn converted_version_may_register_first() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<FlunderV1beta1>().with_conversion::<Flunder>())
        .register(ResourceDescriptor::of::<Flunder>());
    let routes = finalize(registry);

    let beta = routes.storage(&flunders("v1beta1")).unwrap();
    let alpha = routes.storage(&flunders("v1alpha1")).unwrap();
    assert!(Arc::ptr_eq(&alpha, &beta));
    assert!(beta.new_object().downcast_ref::<Flunder>().is_some());
}

#[test]
fn later_versions_cannot_bring_their_own_storage() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>())
        .register_with_handler(
            ResourceDescriptor::of::<FlunderV1beta1>().with_conversion::<Flunder>(),
            static_handler(Arc::new(Fortunes)),
        );

    assert_eq!(
        config_errors(registry),
        vec![ConfigError::ProviderConflict {
            resource: flunders("v1beta1"),
            variant: "handler",
        }]
    );
}

#[test]
fn duplicate_routes_are_rejected() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>())
        .register(ResourceDescriptor::of::<Flunder>());

    assert_eq!(
        config_errors(registry),
        vec![ConfigError::DuplicateRoute {
            resource: flunders("v1alpha1"),
        }]
    );
}

#[test]
fn every_error_is_reported_and_nothing_is_served() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Fleet>().with_status())
        .register(ResourceDescriptor::of::<FlunderV1beta1>())
        .register_subresource(flunders("v1alpha1"), "history")
        .register_subresource(
            GroupVersionResource::new(GROUP, "v1alpha1", "fleets"),
            "a/b",
        );
    assert_eq!(registry.errors().len(), 3);

    let errors = registry.finalize(options()).unwrap_err();
    assert_eq!(errors.len(), 3);
    let message = errors.to_string();
    assert!(message.contains("declares no conversion"), "{message}");
    assert!(message.contains("registered before parent"), "{message}");
    assert!(message.contains("invalid subresource path"), "{message}");
}

#[test]
fn reserved_paths_keep_their_adapters() {
    let fleets = GroupVersionResource::new(GROUP, "v1alpha1", "fleets");
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Fleet>())
        .register_subresource_with_handler(
            fleets.clone(),
            ArbitrarySubResource::parent_shaped("status", Arc::new(ParentEcho::default())),
        );

    assert_eq!(
        config_errors(registry),
        vec![ConfigError::ReservedSubresource {
            parent: fleets,
            path: "status".into(),
        }]
    );
}

#[test]
fn status_without_declaration_is_rejected() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>())
        .register_subresource(flunders("v1alpha1"), "scale");

    assert_eq!(
        config_errors(registry),
        vec![ConfigError::MissingObjectCapability {
            resource: flunders("v1alpha1").with_subresource("scale"),
            kind: "Flunder",
            declaration: "scale",
        }]
    );
}

#[test]
fn routes_carry_kinds_and_adapters() {
    let fleets = GroupVersionResource::new(GROUP, "v1alpha1", "fleets");
    let mut registry = ResourceRegistry::new();
    registry
        .register(
            ResourceDescriptor::of::<Fleet>()
                .with_status()
                .with_scale()
                .with_subresource(ArbitrarySubResource::new::<ConnectOptions>("logs", Arc::new(FleetLogs))),
        )
        .register_with_handler(ResourceDescriptor::of::<Fortune>(), static_handler(Arc::new(Fortunes)));
    let routes = finalize(registry);

    let status = routes.route(&fleets.with_subresource("status")).unwrap();
    assert_eq!(status.adapter(), Some(AdapterKind::Status));
    assert_eq!(status.request_kind().kind, "Fleet");
    assert!(status.storage_kind().group_version().is_internal());

    let scale = routes.route(&fleets.with_subresource("scale")).unwrap();
    assert_eq!(scale.adapter(), Some(AdapterKind::Scale));
    assert_eq!(scale.request_kind(), &Scale::group_version_kind());

    let logs = routes.route(&fleets.with_subresource("logs")).unwrap();
    assert_eq!(logs.adapter(), Some(AdapterKind::Connector));
    assert_eq!(logs.request_kind(), &fleets.group_version().with_kind("ConnectOptions"));

    let fortunes = routes
        .route(&GroupVersionResource::new(GROUP, "v1alpha1", "fortunes"))
        .unwrap();
    assert!(!fortunes.namespace_scoped());
    assert_eq!(fortunes.list_kind(), "FortuneList");
    assert!(
        routes
            .route(&GroupVersionResource::new(GROUP, "v1alpha1", "fortunes").with_subresource("status"))
            .is_none()
    );
    assert_eq!(routes.len(), 5);
}

#[test]
fn subresource_storage_is_shared_across_versions() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>().with_status())
        .register(
            ResourceDescriptor::of::<FlunderV1beta1>()
                .with_status()
                .with_conversion::<Flunder>(),
        );

    let status = GroupResource::new(GROUP, "flunders/status");
    assert!(registry.storage_provider(&status).is_some());
    let routes = finalize(registry);

    let alpha = routes.storage(&flunders("v1alpha1").with_subresource("status")).unwrap();
    let beta = routes.storage(&flunders("v1beta1").with_subresource("status")).unwrap();
    assert!(Arc::ptr_eq(&alpha, &beta));
    assert_eq!(
        routes
            .route(&flunders("v1beta1").with_subresource("status"))
            .unwrap()
            .request_kind(),
        &flunders("v1beta1").group_version().with_kind("Flunder"),
    );
}

#[test]
fn version_priority_follows_registration_order() {
    let mut registry = ResourceRegistry::new();
    registry
        .register(ResourceDescriptor::of::<Flunder>())
        .register(ResourceDescriptor::of::<FlunderV1beta1>().with_conversion::<Flunder>());
    let routes = finalize(registry);

    assert_eq!(
        routes.scheme().prioritized_versions_for_group(GROUP),
        vec![
            GroupVersion::new(GROUP, "v1alpha1"),
            GroupVersion::new(GROUP, "v1beta1"),
        ]
    );
    assert_eq!(routes.group_versions().len(), 2);
}

#[test]
fn construction_is_deferred_until_prepare() {
    let mut registry = ResourceRegistry::new();
    registry.register(ResourceDescriptor::of::<Fleet>().with_status().with_scale());
    let routes = finalize(registry);

    assert!(routes.routes().all(|route| !route.provider().is_initialized()));
    routes.prepare().unwrap();
    assert!(routes.routes().all(|route| route.provider().is_initialized()));
}

#[test]
fn unknown_route_is_reported() {
    let routes = finalize(ResourceRegistry::new());
    let err = routes.storage(&flunders("v1alpha1")).unwrap_err();
    assert_eq!(err, RegistryError::UnknownRoute(flunders("v1alpha1")));
}
