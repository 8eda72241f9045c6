// ============================================================================
// EntityHost Library
// ============================================================================

pub mod core;
pub mod registry;
pub mod entity;
pub mod connection;

// Re-export main types for convenience
pub use crate::core::{ConfigBlob, EntityError, EntityKey, Result};
pub use crate::registry::{
    DestroyPolicy, EntityRegistry, FetchedEntity, RegistryConfig, RegistryStats, SlotInfo,
};
pub use crate::entity::{
    Barrier, BarrierConfig, BarrierEntity, BarrierService, EntityClient, EntityService,
    ServerEntity,
};

// Re-export session API
pub use crate::connection::{Connection, EntityHandle, EntityRef};

/// Build a registry with the built-in entity services registered.
///
/// # Examples
///
/// ```
/// use entityhost::{RegistryConfig, start_registry};
///
/// # #[tokio::main]
/// # async fn main() -> entityhost::Result<()> {
/// let registry = start_registry(RegistryConfig::strict()).await?;
/// assert_eq!(registry.list_services().await, vec![("barrier".to_string(), 1)]);
/// registry.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub async fn start_registry(config: RegistryConfig) -> Result<std::sync::Arc<EntityRegistry>> {
    let registry = EntityRegistry::new(config)?;
    registry.register_service(Box::new(BarrierService)).await?;
    Ok(std::sync::Arc::new(registry))
}
