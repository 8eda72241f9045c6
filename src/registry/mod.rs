// ============================================================================
// Entity Registry
// ============================================================================
//
// Owns one slot per entity key and arbitrates create / fetch / destroy /
// release across sessions.
//
// Locking:
// - `slots` map lock: held only to look up or insert a slot `Arc`
// - per-slot state lock: serializes lifecycle transitions on one key
// - open-handle counter: incremented under the slot lock, released lock-free
// - slot summary: mirrored after each transition, read by introspection
//   without the slot lock
//
// ============================================================================

pub mod config;
pub(crate) mod slot;

use crate::connection::EntityHandle;
use crate::core::{ConfigBlob, EntityError, EntityKey, Result};
use crate::entity::{EntityService, ServerEntity};
use chrono::{DateTime, Utc};
use slot::Slot;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, Level, event, info_span};

pub use config::{DestroyPolicy, RegistryConfig};

/// A live instance together with the open handle that pins it.
pub struct FetchedEntity {
    pub instance: Arc<dyn ServerEntity>,
    pub handle: EntityHandle,
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub key: EntityKey,
    pub exists: bool,
    pub open_handles: usize,
    pub incarnation: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub config_bytes: usize,
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub live_entities: usize,
    pub open_handles: usize,
    pub slot_records: usize,
    pub services: usize,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Stats: {} live entities ({} slot records), {} open handles, {} services",
            self.live_entities, self.slot_records, self.open_handles, self.services
        )
    }
}

/// Server-side entity lifecycle manager.
///
/// Construct one per server and share it behind an `Arc`; sessions
/// ([`Connection`](crate::Connection)) hold a clone.
pub struct EntityRegistry {
    config: RegistryConfig,
    services: RwLock<HashMap<String, Arc<dyn EntityService>>>,
    slots: Mutex<HashMap<EntityKey, Arc<Slot>>>,
    shut_down: AtomicBool,
}

impl EntityRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            services: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register the provider of one entity type.
    pub async fn register_service(&self, service: Box<dyn EntityService>) -> Result<()> {
        self.ensure_running()?;

        let entity_type = service.entity_type().to_string();
        let mut services = self.services.write().await;
        if services.contains_key(&entity_type) {
            return Err(EntityError::ServiceExists(entity_type));
        }

        event!(
            Level::INFO,
            entity_type = %entity_type,
            version = service.version(),
            "entity service registered"
        );
        services.insert(entity_type, Arc::from(service));
        Ok(())
    }

    pub async fn list_services(&self) -> Vec<(String, u64)> {
        let services = self.services.read().await;
        let mut listed: Vec<_> = services
            .values()
            .map(|s| (s.entity_type().to_string(), s.version()))
            .collect();
        listed.sort();
        listed
    }

    /// Create the entity at `key` from `config`.
    ///
    /// Exactly one of any number of concurrent creates on an absent key
    /// succeeds; the rest fail with `AlreadyExists`.
    pub async fn create(&self, key: &EntityKey, config: ConfigBlob) -> Result<()> {
        let span = info_span!("entity_create", entity = %key);
        async move {
            self.ensure_running()?;
            let service = self.resolve_service(key).await?;

            let slot = self.slot_for_create(key).await?;
            let mut state = slot.state().lock().await;
            // Shutdown may have drained the slot while we waited for it.
            self.ensure_running()?;
            if state.exists {
                event!(Level::DEBUG, "create rejected, entity already exists");
                return Err(EntityError::AlreadyExists(key.clone()));
            }

            // Nothing is written to the slot until construction succeeds.
            let instance = match service.create_entity(key, &config).await {
                Ok(instance) => instance,
                Err(err) => {
                    event!(Level::WARN, error = %err, "entity construction failed");
                    return Err(err);
                }
            };

            state.exists = true;
            state.instance = Some(instance);
            state.config = Some(config);
            state.created_at = Some(Utc::now());
            state.incarnation += 1;
            slot.publish(&state);

            event!(Level::INFO, incarnation = state.incarnation, "entity created");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Open a handle on the live entity at `key`.
    pub async fn fetch(&self, key: &EntityKey) -> Result<FetchedEntity> {
        self.ensure_running()?;

        let slot = self
            .existing_slot(key)
            .await
            .ok_or_else(|| EntityError::NotFound(key.clone()))?;

        let state = slot.state().lock().await;
        let instance = match (state.exists, state.instance.as_ref()) {
            (true, Some(instance)) => Arc::clone(instance),
            _ => return Err(EntityError::NotFound(key.clone())),
        };
        let epoch = slot.acquire();
        drop(state);

        event!(Level::DEBUG, entity = %key, open_handles = slot.open_handles(), "entity fetched");
        Ok(FetchedEntity {
            instance,
            handle: EntityHandle::new(slot, epoch),
        })
    }

    /// Destroy the live entity at `key`, running its teardown hook.
    ///
    /// With open handles, [`DestroyPolicy::Strict`] fails with `Busy`;
    /// [`DestroyPolicy::Permissive`] holds the key and waits for the handles
    /// to be closed, failing with `Timeout` after the drain timeout;
    /// [`DestroyPolicy::Relaxed`] detaches them and proceeds.
    pub async fn destroy(&self, key: &EntityKey) -> Result<()> {
        let span = info_span!("entity_destroy", entity = %key);
        async move {
            self.ensure_running()?;

            let slot = self
                .existing_slot(key)
                .await
                .ok_or_else(|| EntityError::NotFound(key.clone()))?;

            let mut state = slot.state().lock().await;
            if !state.exists {
                return Err(EntityError::NotFound(key.clone()));
            }

            // Once shut down, nothing may hold the key waiting for handles.
            let policy = if self.is_shut_down() {
                DestroyPolicy::Relaxed
            } else {
                self.config.destroy_policy
            };

            let open_handles = slot.open_handles();
            if open_handles > 0 {
                match policy {
                    DestroyPolicy::Strict => {
                        event!(Level::DEBUG, open_handles, "destroy rejected, entity busy");
                        return Err(EntityError::Busy {
                            key: key.clone(),
                            open_handles,
                        });
                    }
                    DestroyPolicy::Permissive => {
                        let timeout = self.config.drain_timeout_duration();
                        event!(Level::DEBUG, open_handles, ?timeout, "destroy waiting for handles");
                        if tokio::time::timeout(timeout, slot.drained()).await.is_err() {
                            event!(Level::WARN, ?timeout, "destroy timed out waiting for handles");
                            return Err(EntityError::Timeout {
                                key: key.clone(),
                                timeout,
                            });
                        }
                    }
                    DestroyPolicy::Relaxed => {
                        let detached = slot.detach_all();
                        event!(Level::DEBUG, detached, "destroy detached open handles");
                    }
                }
            }

            let instance = state.clear();
            slot.publish(&state);
            if let Some(instance) = instance {
                instance.teardown();
            }

            event!(Level::INFO, "entity destroyed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn describe(&self, key: &EntityKey) -> Option<SlotInfo> {
        let slot = self.existing_slot(key).await?;
        Some(Self::slot_info(&slot))
    }

    /// All live entities, ordered by key.
    pub async fn list_entities(&self) -> Vec<SlotInfo> {
        let mut listed = Vec::new();
        for slot in self.snapshot_slots().await {
            let info = Self::slot_info(&slot);
            if info.exists {
                listed.push(info);
            }
        }
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        listed
    }

    pub async fn stats(&self) -> RegistryStats {
        let slots = self.snapshot_slots().await;
        let mut live_entities = 0;
        let mut open_handles = 0;
        for slot in &slots {
            if slot.summary().exists {
                live_entities += 1;
            }
            open_handles += slot.open_handles();
        }

        RegistryStats {
            live_entities,
            open_handles,
            slot_records: slots.len(),
            services: self.services.read().await.len(),
        }
    }

    /// Drop slot records that hold no entity and that no operation or
    /// handle is using. Returns the number of records removed.
    pub async fn reclaim_idle_slots(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();

        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.state().try_lock() {
                Ok(state) => state.exists,
                Err(_) => true,
            }
        });

        let reclaimed = before - slots.len();
        if reclaimed > 0 {
            event!(Level::DEBUG, reclaimed, "idle entity slots reclaimed");
        }
        reclaimed
    }

    /// Destroy every live entity regardless of open handles and reject all
    /// further operations with `ShutDown`.
    ///
    /// Permissive destroys still draining are released first, so shutdown
    /// never waits out a drain timeout.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<Arc<Slot>> = {
            let mut slots = self.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };

        for slot in &slots {
            slot.detach_all();
        }

        let mut destroyed = 0usize;
        for slot in slots {
            let mut state = slot.state().lock().await;
            slot.detach_all();
            let instance = state.clear();
            slot.publish(&state);
            if let Some(instance) = instance {
                instance.teardown();
                destroyed += 1;
            }
        }

        event!(Level::INFO, destroyed, "entity registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(EntityError::ShutDown);
        }
        Ok(())
    }

    async fn resolve_service(&self, key: &EntityKey) -> Result<Arc<dyn EntityService>> {
        let services = self.services.read().await;
        let service = services
            .get(key.entity_type())
            .cloned()
            .ok_or_else(|| EntityError::NotProvided(key.entity_type().to_string()))?;

        if service.version() != key.version() {
            return Err(EntityError::VersionMismatch {
                entity_type: key.entity_type().to_string(),
                expected: service.version(),
                requested: key.version(),
            });
        }
        Ok(service)
    }

    /// Checked under the map lock: shutdown sets its flag before draining
    /// the map, so no slot can be inserted after the drain.
    async fn slot_for_create(&self, key: &EntityKey) -> Result<Arc<Slot>> {
        let mut slots = self.slots.lock().await;
        self.ensure_running()?;
        Ok(Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new(key.clone()))),
        ))
    }

    async fn existing_slot(&self, key: &EntityKey) -> Option<Arc<Slot>> {
        self.slots.lock().await.get(key).cloned()
    }

    async fn snapshot_slots(&self) -> Vec<Arc<Slot>> {
        self.slots.lock().await.values().cloned().collect()
    }

    fn slot_info(slot: &Slot) -> SlotInfo {
        let summary = slot.summary();
        SlotInfo {
            key: slot.key().clone(),
            exists: summary.exists,
            open_handles: slot.open_handles(),
            incarnation: summary.incarnation,
            created_at: summary.created_at,
            config_bytes: summary.config_bytes,
        }
    }
}
