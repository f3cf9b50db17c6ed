//! Service discovery integration tests
//!
//! These tests run two services against one in-process coordination store and check
//! that each one sees the other only while it is registered.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use svcglue::config::{Options, Registration};
use svcglue::service_discovery::{
    build_environment, build_service, Client, ClientFactory, DiscoveryError, EnvironmentBuilder,
    Instancer, MemoryStore, Registrar,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("svcglue=debug")
        .with_test_writer()
        .try_init();
}

fn talaria_options() -> Options {
    Options::default()
        .with_servers(["zk1:2181", "zk2:2181"])
        .with_registration(
            Registration::new("10.0.0.1", 6200)
                .with_name("talaria")
                .with_path("/xmidt/talaria"),
        )
        .with_watch("/xmidt/scytale")
}

fn scytale_options() -> Options {
    Options::default()
        .with_registration(
            Registration::new("10.0.0.2", 6300)
                .with_name("scytale")
                .with_path("/xmidt/scytale"),
        )
        .with_watch("/xmidt/talaria")
}

#[tokio::test]
async fn test_services_discover_each_other() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let talaria = build_environment(store.clone(), None, &talaria_options(), Vec::new())
        .await
        .expect("talaria environment")
        .expect("talaria has discovery configured");
    let scytale = build_environment(store.clone(), None, &scytale_options(), Vec::new())
        .await
        .expect("scytale environment")
        .expect("scytale has discovery configured");

    let mut talaria_sees = talaria
        .instancers()
        .get("/xmidt/scytale")
        .expect("watch on scytale")
        .subscribe();
    let mut scytale_sees = scytale
        .instancers()
        .get("/xmidt/talaria")
        .expect("watch on talaria")
        .subscribe();

    assert!(talaria_sees.next().await.unwrap().instances.is_empty());
    assert!(scytale_sees.next().await.unwrap().instances.is_empty());

    talaria.register().await;
    scytale.register().await;

    let event = scytale_sees.next().await.unwrap();
    assert_eq!(event.path, "/xmidt/talaria");
    assert_eq!(event.instances, vec!["http://10.0.0.1:6200".to_string()]);

    let event = talaria_sees.next().await.unwrap();
    assert_eq!(event.instances, vec!["http://10.0.0.2:6300".to_string()]);

    // closing talaria's session removes its registration and ends its watches
    talaria.close().await.expect("close talaria");
    assert!(talaria.is_closed());
    assert!(store.instances("/xmidt/talaria").is_empty());
    assert!(scytale_sees.next().await.unwrap().instances.is_empty());
    assert!(talaria_sees.next().await.is_none());

    scytale.close().await.expect("close scytale");
    assert!(store.instances("/xmidt/scytale").is_empty());
    assert_eq!(store.watch_count("/xmidt/talaria"), 0);
}

#[tokio::test]
async fn test_watch_scenario_dedupes_paths() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let options = Options::default()
        .with_servers(["s1"])
        .with_watch("/svc/a")
        .with_watch("/svc/a")
        .with_watch("/svc/b");

    let environment = EnvironmentBuilder::new(store.clone())
        .build(&options, Vec::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(environment.instancers().len(), 2);
    assert!(environment.instancers().has("/svc/a"));
    assert!(environment.instancers().has("/svc/b"));
    assert_eq!(store.watch_count("/svc/a"), 1);
    assert!(environment.registrars().is_empty());

    environment.close().await.unwrap();
}

#[tokio::test]
async fn test_registration_scenario_dedupes_endpoints() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let options = Options::default()
        .with_registration(Registration::new("10.0.0.1", 8080).with_path("/svc/a"))
        .with_registration(Registration::new("10.0.0.1", 8080).with_path("/svc/a"));

    let environment = EnvironmentBuilder::new(store.clone())
        .with_span(tracing::info_span!("dedupe"))
        .build(&options, Vec::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(environment.registrars().len(), 1);
    assert_eq!(environment.duplicates().registrations, 1);

    environment.register().await;
    assert_eq!(
        store.instances("/svc/a"),
        vec!["http://10.0.0.1:8080".to_string()]
    );
    assert!(environment.is_registered("http://10.0.0.1:8080"));

    environment.close().await.unwrap();
    assert!(store.instances("/svc/a").is_empty());
}

#[tokio::test]
async fn test_nothing_configured_builds_nothing() {
    let store = Arc::new(MemoryStore::new());
    let options = Options::default();

    let environment = build_environment(store, None, &options, Vec::new())
        .await
        .unwrap();
    assert!(environment.is_none());
}

#[tokio::test]
async fn test_connect_failure_surfaces() {
    let store = Arc::new(MemoryStore::new());
    let options = Options::default()
        .with_servers(Vec::<String>::new())
        .with_watch("/svc/a");

    let err = build_environment(store.clone(), None, &options, Vec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::ConnectFailed { .. }));
    assert_eq!(store.watch_count("/svc/a"), 0);
}

#[tokio::test]
async fn test_invalid_watch_releases_session() {
    let store = Arc::new(MemoryStore::new());

    // a registration from an unrelated session must survive the failed build
    let other = store
        .connect(&["s1".to_string()], Duration::from_secs(1), Duration::from_secs(1))
        .await
        .unwrap();
    let (_, record) = build_service(&Registration::new("10.0.0.9", 9000).with_path("/svc/a"));
    other.new_registrar(record).register().await;

    let options = Options::default()
        .with_watch("/svc/a")
        .with_watch("not-a-path")
        .with_registration(Registration::new("10.0.0.1", 8080).with_path("/svc/a"));

    let err = EnvironmentBuilder::new(store.clone())
        .build(&options, Vec::new())
        .await
        .unwrap_err();

    match err {
        DiscoveryError::InstancerCreationFailed { path, .. } => assert_eq!(path, "not-a-path"),
        unexpected => panic!("unexpected error: {}", unexpected),
    }
    assert_eq!(store.watch_count("/svc/a"), 0);
    assert_eq!(
        store.instances("/svc/a"),
        vec!["http://10.0.0.9:9000".to_string()]
    );

    other.stop().await.unwrap();
    assert!(store.instances("/svc/a").is_empty());
}
