pub mod entity_ref;
pub mod handle;

use crate::core::{EntityError, Result};
use crate::entity::EntityClient;
use crate::registry::EntityRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{Level, event};
use uuid::Uuid;

pub use entity_ref::EntityRef;
pub use handle::EntityHandle;

/// State shared by a connection and the refs and handles it hands out.
pub(crate) struct Session {
    id: Uuid,
    closed: AtomicBool,
    open_handles: AtomicUsize,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            closed: AtomicBool::new(false),
            open_handles: AtomicUsize::new(0),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EntityError::ConnectionClosed(self.id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn handle_opened(&self) {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn handle_closed(&self) {
        let _ = self
            .open_handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

/// Client session against an entity registry.
///
/// Similar to a database connection: cheap to open, identified by a
/// unique id, and the origin of every entity reference it creates.
///
/// # Examples
///
/// ```
/// use entityhost::{Barrier, BarrierConfig, BarrierService, Connection, EntityRegistry, RegistryConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> entityhost::Result<()> {
/// let registry = Arc::new(EntityRegistry::new(RegistryConfig::default())?);
/// registry.register_service(Box::new(BarrierService)).await?;
///
/// let conn = Connection::new(Arc::clone(&registry));
/// let gate = conn.get_entity_ref::<Barrier>("gate", 1);
/// gate.create(&BarrierConfig::new(1)).await?;
///
/// let barrier = gate.fetch_entity().await?;
/// assert_eq!(barrier.get_parties(), 1);
/// barrier.close()?;
///
/// gate.destroy().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    session: Arc<Session>,
    registry: Arc<EntityRegistry>,
}

impl Connection {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        let session = Arc::new(Session::new());
        event!(Level::DEBUG, session = %session.id(), "connection opened");
        Self { session, registry }
    }

    /// Get connection ID
    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    /// Build a typed reference to `name` at `version`. Never fails.
    pub fn get_entity_ref<T: EntityClient>(&self, name: &str, version: u64) -> EntityRef<T> {
        EntityRef::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.session),
            name,
            version,
        )
    }

    /// Handles fetched through this connection that are still open
    pub fn open_handles(&self) -> usize {
        self.session.open_handles()
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.session.ensure_open().is_ok()
    }

    /// Close the connection
    ///
    /// Refs built from this connection stop working; handles already
    /// fetched stay valid until they are closed.
    pub fn close(&mut self) -> Result<()> {
        if self.session.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        event!(
            Level::DEBUG,
            session = %self.session.id(),
            open_handles = self.session.open_handles(),
            "connection closed"
        );
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
