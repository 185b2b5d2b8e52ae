//! A store over the JSON file backend keeps objects across reopen.

use apiary_runtime::{GroupResource, Object, ObjectMeta, TypedObject};
use apiary_storage::config::{BackendConfig, RestOptionsGetter, StorageConfig, StorageOptions};
use apiary_storage::context::RequestContext;
use apiary_storage::request::{CreateOptions, GetOptions, ListOptions};
use apiary_storage::rest::{Creater, Getter, Lister};
use apiary_storage::store::Store;
use apiary_storage::strategy::DefaultStrategy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Fortune {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    value: String,
}

impl TypedObject for Fortune {
    const KIND: &'static str = "Fortune";
    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn object_meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

fn open_store(root: &std::path::Path) -> Store {
    open_store_scoped(root, false)
}

fn open_store_scoped(root: &std::path::Path, namespaced: bool) -> Store {
    let options = StorageOptions::new(StorageConfig {
        backend: BackendConfig::JsonFile {
            root: root.to_path_buf(),
        },
        ..StorageConfig::default()
    });
    let mut store = Store::new(
        GroupResource::new("wardle.example.com", "fortunes"),
        Arc::new(|| Box::new(Fortune::default()) as Box<dyn Object>),
        "FortuneList",
        Arc::new(DefaultStrategy::new(namespaced)),
    );
    store.complete_with_options(&options).unwrap();
    assert!(options.rest_options(&store.qualified_resource).is_ok());
    store
}

#[tokio::test]
async fn objects_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RequestContext::new();

    let created = {
        let store = open_store(dir.path());
        let fortune = Fortune {
            metadata: ObjectMeta::named("today"),
            value: "sunny".into(),
        };
        store
            .create(&ctx, Box::new(fortune), None, &CreateOptions::default())
            .await
            .unwrap()
    };
    assert!(
        dir.path()
            .join("registry/wardle.example.com/fortunes/today.json")
            .is_file()
    );

    let store = open_store(dir.path());
    let fetched = store.get(&ctx, "today", &GetOptions::default()).await.unwrap();
    assert_eq!(fetched.meta().uid, created.meta().uid);
    assert_eq!(fetched.meta().resource_version, created.meta().resource_version);
    assert_eq!(fetched.downcast_ref::<Fortune>().unwrap().value, "sunny");

    let list = store.list(&ctx, &ListOptions::default()).await.unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.resource_version, created.meta().resource_version);
}

#[tokio::test]
async fn namespaces_stay_below_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    let store = open_store_scoped(&root, true);
    let ctx = RequestContext::new().with_namespace("../../../../escaped");

    let fortune = Fortune {
        metadata: ObjectMeta::named("x"),
        value: "cloudy".into(),
    };
    let err = store
        .create(&ctx, Box::new(fortune), None, &CreateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
    assert!(!dir.path().join("escaped").exists());
    assert!(store.list(&ctx, &ListOptions::default()).await.is_err());
}
