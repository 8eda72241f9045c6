// ============================================================================
// Entity Contracts
// ============================================================================
//
// Three seams:
// - EntityService: server-side factory for one entity type and version
// - ServerEntity:  the live instance held by a registry slot
// - EntityClient:  typed client binding returned by `EntityRef::fetch_entity`
//
// ============================================================================

pub mod barrier;

use crate::connection::EntityHandle;
use crate::core::{ConfigBlob, EntityKey, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

pub use barrier::{Barrier, BarrierConfig, BarrierEntity, BarrierService};

/// Server-side provider of one entity type.
///
/// Registered once with [`EntityRegistry::register_service`](crate::EntityRegistry::register_service).
/// The registry resolves the service from the key's type name and rejects
/// creates whose version differs from [`EntityService::version`].
#[async_trait]
pub trait EntityService: Send + Sync {
    /// Type name this service answers for.
    fn entity_type(&self) -> &str;

    /// The single entity version this service can construct.
    fn version(&self) -> u64;

    /// Build a live instance from its configuration.
    ///
    /// An error here leaves the slot absent.
    async fn create_entity(
        &self,
        key: &EntityKey,
        config: &ConfigBlob,
    ) -> Result<Arc<dyn ServerEntity>>;
}

/// A live entity instance owned by a registry slot.
pub trait ServerEntity: Send + Sync + 'static {
    /// Called exactly once, under the slot lock, when the entity is destroyed.
    fn teardown(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Client-side view of an entity type.
pub trait EntityClient: Sized + Send {
    type Config;
    type Server: ServerEntity;

    const ENTITY_TYPE: &'static str;

    fn encode_config(config: &Self::Config) -> Result<ConfigBlob>;

    fn bind(entity: Arc<Self::Server>, handle: EntityHandle) -> Self;
}
