use super::{EntityClient, EntityService, ServerEntity};
use crate::connection::EntityHandle;
use crate::core::{ConfigBlob, EntityError, EntityKey, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{Level, event};

/// Configuration of a barrier: the number of parties per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierConfig {
    parties: u32,
}

impl BarrierConfig {
    pub fn new(parties: u32) -> Self {
        Self { parties }
    }

    pub fn parties(&self) -> u32 {
        self.parties
    }
}

struct BarrierState {
    arrived: u32,
    generation: u64,
    next_ticket: u64,
    waiters: Vec<(u64, oneshot::Sender<u32>)>,
    destroyed: bool,
}

/// Arrival parked in a generation. Dropping it before release withdraws
/// the arrival.
struct PendingArrival<'a> {
    barrier: &'a BarrierEntity,
    generation: u64,
    ticket: u64,
    armed: bool,
}

impl Drop for PendingArrival<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = self.barrier.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.destroyed || state.generation != self.generation {
            return;
        }
        if let Some(pos) = state.waiters.iter().position(|(t, _)| *t == self.ticket) {
            state.waiters.swap_remove(pos);
            state.arrived -= 1;
            event!(
                Level::DEBUG,
                entity = %self.barrier.key,
                generation = self.generation,
                "barrier arrival withdrawn"
            );
        }
    }
}

/// N-party rendezvous hosted by the registry.
///
/// Every `parties`-th call to [`arrive`](Self::arrive) releases itself and
/// all callers waiting in the same generation, then starts a new generation.
pub struct BarrierEntity {
    key: EntityKey,
    parties: u32,
    state: Mutex<BarrierState>,
}

impl BarrierEntity {
    pub fn new(key: EntityKey, config: BarrierConfig) -> Result<Self> {
        if config.parties == 0 {
            return Err(EntityError::InvalidConfig(
                "barrier parties must be > 0".into(),
            ));
        }

        Ok(Self {
            key,
            parties: config.parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                next_ticket: 0,
                waiters: Vec::new(),
                destroyed: false,
            }),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn get_parties(&self) -> u32 {
        self.parties
    }

    /// Number of completed rounds.
    pub fn generation(&self) -> Result<u64> {
        Ok(self.state.lock()?.generation)
    }

    /// Arrivals counted so far in the current generation.
    pub fn waiting(&self) -> Result<u32> {
        Ok(self.state.lock()?.arrived)
    }

    /// Arrive at the barrier and wait for the rest of the generation.
    ///
    /// Returns the party count of the released generation. A caller whose
    /// future is dropped while waiting no longer counts toward the round.
    pub async fn arrive(&self) -> Result<u32> {
        let (released, mut pending) = {
            let mut state = self.state.lock()?;
            if state.destroyed {
                return Err(EntityError::Destroyed(self.key.clone()));
            }

            state.arrived += 1;
            if state.arrived == self.parties {
                let waiters = std::mem::take(&mut state.waiters);
                state.arrived = 0;
                state.generation += 1;

                for (_, waiter) in waiters {
                    let _ = waiter.send(self.parties);
                }

                event!(
                    Level::DEBUG,
                    entity = %self.key,
                    generation = state.generation,
                    "barrier released"
                );
                return Ok(self.parties);
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push((ticket, tx));

            let pending = PendingArrival {
                barrier: self,
                generation: state.generation,
                ticket,
                armed: true,
            };
            (rx, pending)
        };

        let outcome = released.await;
        pending.armed = false;
        outcome.map_err(|_| EntityError::Destroyed(self.key.clone()))
    }
}

impl ServerEntity for BarrierEntity {
    fn teardown(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.destroyed = true;

        let stranded = state.waiters.len();
        // Dropping the senders wakes every waiter with `Destroyed`.
        state.waiters.clear();
        state.arrived = 0;

        if stranded > 0 {
            event!(
                Level::INFO,
                entity = %self.key,
                stranded,
                "barrier destroyed with parties waiting"
            );
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Provides the `barrier` entity type, version 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarrierService;

impl BarrierService {
    pub const ENTITY_TYPE: &'static str = "barrier";
    pub const VERSION: u64 = 1;
}

#[async_trait]
impl EntityService for BarrierService {
    fn entity_type(&self) -> &str {
        Self::ENTITY_TYPE
    }

    fn version(&self) -> u64 {
        Self::VERSION
    }

    async fn create_entity(
        &self,
        key: &EntityKey,
        config: &ConfigBlob,
    ) -> Result<Arc<dyn ServerEntity>> {
        let config: BarrierConfig = config.decode()?;
        Ok(Arc::new(BarrierEntity::new(key.clone(), config)?))
    }
}

/// Client handle on a fetched barrier.
///
/// Holds one open reference on the barrier until [`close`](Self::close)
/// is called or the handle is dropped.
pub struct Barrier {
    entity: Arc<BarrierEntity>,
    handle: EntityHandle,
}

impl Barrier {
    pub async fn arrive(&self) -> Result<u32> {
        self.entity.arrive().await
    }

    pub fn get_parties(&self) -> u32 {
        self.entity.get_parties()
    }

    pub fn generation(&self) -> Result<u64> {
        self.entity.generation()
    }

    pub fn key(&self) -> &EntityKey {
        self.handle.key()
    }

    /// Release this reference.
    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl EntityClient for Barrier {
    type Config = BarrierConfig;
    type Server = BarrierEntity;

    const ENTITY_TYPE: &'static str = BarrierService::ENTITY_TYPE;

    fn encode_config(config: &BarrierConfig) -> Result<ConfigBlob> {
        ConfigBlob::encode(config)
    }

    fn bind(entity: Arc<BarrierEntity>, handle: EntityHandle) -> Self {
        Self { entity, handle }
    }
}
