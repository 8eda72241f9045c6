/// Basic entity interaction tests
///
/// Create / fetch / destroy semantics as seen from a client connection.
/// Run with: cargo test --test entity_interaction_tests

use entityhost::{
    Barrier, BarrierConfig, Connection, EntityError, RegistryConfig, start_registry,
};
use std::time::Duration;

const ENTITY_NAME: &str = "testEntity-";

async fn connect(config: RegistryConfig) -> Connection {
    let registry = start_registry(config).await.unwrap();
    Connection::new(registry)
}

#[tokio::test]
async fn test_absent_entity_retrieval_fails() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    match entity_ref.fetch_entity().await {
        Err(EntityError::NotFound(key)) => assert_eq!(&key, entity_ref.key()),
        Err(other) => panic!("expected NotFound, got {other}"),
        Ok(_) => panic!("expected NotFound, got an entity"),
    }
}

#[tokio::test]
async fn test_absent_entity_creation_succeeds() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    let entity = entity_ref.fetch_entity().await.unwrap();
    assert_eq!(entity.get_parties(), 1);
    entity.close().unwrap();

    entity_ref.destroy().await.unwrap();
}

#[tokio::test]
async fn test_present_entity_creation_fails() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();

    assert!(matches!(
        entity_ref.create(&BarrierConfig::new(1)).await,
        Err(EntityError::AlreadyExists(_))
    ));
    assert!(matches!(
        entity_ref.create(&BarrierConfig::new(2)).await,
        Err(EntityError::AlreadyExists(_))
    ));

    // The original configuration is untouched.
    let entity = entity_ref.fetch_entity().await.unwrap();
    assert_eq!(entity.get_parties(), 1);
    entity.close().unwrap();

    entity_ref.destroy().await.unwrap();
}

#[tokio::test]
async fn test_absent_entity_destroy_fails() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    assert!(matches!(
        entity_ref.destroy().await,
        Err(EntityError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_present_entity_destroy_succeeds() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    entity_ref.destroy().await.unwrap();

    assert!(matches!(
        entity_ref.fetch_entity().await,
        Err(EntityError::NotFound(_))
    ));
    assert!(matches!(
        entity_ref.destroy().await,
        Err(EntityError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_present_entity_destroy_blocked_by_held_reference_strict() {
    let client = connect(RegistryConfig::strict()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    let entity = entity_ref.fetch_entity().await.unwrap();

    assert!(matches!(
        entity_ref.destroy().await,
        Err(EntityError::Busy { open_handles: 1, .. })
    ));

    entity.close().unwrap();
    entity_ref.destroy().await.unwrap();
}

#[tokio::test]
async fn test_present_entity_destroy_waits_for_held_reference_permissive() {
    let client = connect(RegistryConfig::permissive()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    let entity = entity_ref.fetch_entity().await.unwrap();

    let destroying = {
        let entity_ref = entity_ref.clone();
        tokio::spawn(async move { entity_ref.destroy().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!destroying.is_finished(), "destroy must wait for the open handle");

    entity.close().unwrap();
    tokio::time::timeout(Duration::from_secs(1), destroying)
        .await
        .expect("destroy did not resume after close")
        .unwrap()
        .unwrap();

    assert!(matches!(
        entity_ref.fetch_entity().await,
        Err(EntityError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_present_entity_destroy_with_held_reference_relaxed() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    let entity = entity_ref.fetch_entity().await.unwrap();

    entity_ref.destroy().await.unwrap();
    assert!(matches!(entity.arrive().await, Err(EntityError::Destroyed(_))));
    entity.close().unwrap();
    assert_eq!(client.open_handles(), 0);
}

#[tokio::test]
async fn test_present_entity_destroy_not_blocked_by_released_reference_succeeds() {
    let client = connect(RegistryConfig::strict()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    entity_ref.fetch_entity().await.unwrap().close().unwrap();
    entity_ref.destroy().await.unwrap();
}

#[tokio::test]
async fn test_destroyed_entity_allows_recreation() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    entity_ref.create(&BarrierConfig::new(2)).await.unwrap();
    entity_ref.destroy().await.unwrap();

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
    let entity = entity_ref.fetch_entity().await.unwrap();
    assert_eq!(entity.get_parties(), 1);
    entity.close().unwrap();

    entity_ref.destroy().await.unwrap();
}

#[tokio::test]
async fn test_wrong_version_creation_fails() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 2);

    assert!(matches!(
        entity_ref.create(&BarrierConfig::new(1)).await,
        Err(EntityError::VersionMismatch { expected: 1, requested: 2, .. })
    ));
    assert!(matches!(
        entity_ref.fetch_entity().await,
        Err(EntityError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_config_leaves_entity_absent() {
    let client = connect(RegistryConfig::default()).await;
    let entity_ref = client.get_entity_ref::<Barrier>(ENTITY_NAME, 1);

    assert!(matches!(
        entity_ref.create(&BarrierConfig::new(0)).await,
        Err(EntityError::InvalidConfig(_))
    ));
    assert!(matches!(
        entity_ref.fetch_entity().await,
        Err(EntityError::NotFound(_))
    ));

    entity_ref.create(&BarrierConfig::new(1)).await.unwrap();
}

#[tokio::test]
async fn test_entities_visible_across_connections() {
    let registry = start_registry(RegistryConfig::default()).await.unwrap();
    let creator = Connection::new(registry.clone());
    let reader = Connection::new(registry.clone());

    creator
        .get_entity_ref::<Barrier>("shared", 1)
        .create(&BarrierConfig::new(4))
        .await
        .unwrap();

    let entity = reader
        .get_entity_ref::<Barrier>("shared", 1)
        .fetch_entity()
        .await
        .unwrap();
    assert_eq!(entity.get_parties(), 4);
    assert_eq!(reader.open_handles(), 1);
    assert_eq!(creator.open_handles(), 0);

    let listed = registry.list_entities().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].open_handles, 1);

    entity.close().unwrap();
}
