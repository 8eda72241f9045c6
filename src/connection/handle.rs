use super::Session;
use crate::core::{EntityError, EntityKey, Result};
use crate::registry::slot::Slot;
use log::warn;
use std::sync::Arc;

/// One open reference on a live entity.
///
/// Closing the handle (explicitly or on drop) decrements the slot's
/// open-handle count. It never affects whether the entity exists. A handle
/// detached by a relaxed destroy still closes cleanly.
pub struct EntityHandle {
    slot: Option<Arc<Slot>>,
    epoch: u32,
    key: EntityKey,
    session: Option<Arc<Session>>,
}

impl EntityHandle {
    pub(crate) fn new(slot: Arc<Slot>, epoch: u32) -> Self {
        let key = slot.key().clone();
        Self {
            slot: Some(slot),
            epoch,
            key,
            session: None,
        }
    }

    /// Count this handle against `session` until it is closed.
    pub(crate) fn attach(&mut self, session: Arc<Session>) {
        session.handle_opened();
        self.session = Some(session);
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn is_open(&self) -> bool {
        self.slot.is_some()
    }

    /// Release the reference.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let slot = self
            .slot
            .take()
            .ok_or_else(|| EntityError::HandleClosed(self.key.clone()))?;
        slot.release(self.epoch);

        if let Some(session) = self.session.take() {
            session.handle_closed();
        }
        Ok(())
    }
}

impl Drop for EntityHandle {
    fn drop(&mut self) {
        if self.slot.is_some() {
            warn!(
                "EntityHandle on '{}' dropped without close(); releasing it now",
                self.key
            );
            let _ = self.release();
        }
    }
}
