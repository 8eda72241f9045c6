use super::Session;
use crate::core::{EntityError, EntityKey, Result};
use crate::entity::EntityClient;
use crate::registry::EntityRegistry;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed reference to the entity slot `(T::ENTITY_TYPE, name, version)`.
///
/// Building a reference never touches the registry; every operation on it
/// is a registry round-trip made on behalf of the owning session.
pub struct EntityRef<T: EntityClient> {
    key: EntityKey,
    registry: Arc<EntityRegistry>,
    session: Arc<Session>,
    _client: PhantomData<fn() -> T>,
}

impl<T: EntityClient> EntityRef<T> {
    pub(crate) fn new(
        registry: Arc<EntityRegistry>,
        session: Arc<Session>,
        name: &str,
        version: u64,
    ) -> Self {
        Self {
            key: EntityKey::new(T::ENTITY_TYPE, name, version),
            registry,
            session,
            _client: PhantomData,
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Create the entity with `config`.
    pub async fn create(&self, config: &T::Config) -> Result<()> {
        self.session.ensure_open()?;
        let blob = T::encode_config(config)?;
        self.registry.create(&self.key, blob).await
    }

    /// Fetch the live entity, opening a handle on it.
    pub async fn fetch_entity(&self) -> Result<T> {
        self.session.ensure_open()?;
        let fetched = self.registry.fetch(&self.key).await?;

        let mut handle = fetched.handle;
        let server = match fetched.instance.into_any().downcast::<T::Server>() {
            Ok(server) => server,
            Err(_) => {
                handle.close()?;
                return Err(EntityError::TypeMismatch(self.key.clone()));
            }
        };

        handle.attach(Arc::clone(&self.session));
        Ok(T::bind(server, handle))
    }

    /// Destroy the entity.
    pub async fn destroy(&self) -> Result<()> {
        self.session.ensure_open()?;
        self.registry.destroy(&self.key).await
    }
}

impl<T: EntityClient> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            registry: Arc::clone(&self.registry),
            session: Arc::clone(&self.session),
            _client: PhantomData,
        }
    }
}

impl<T: EntityClient> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("key", &self.key)
            .field("session", &self.session.id())
            .finish()
    }
}
