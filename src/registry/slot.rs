use crate::core::{ConfigBlob, EntityKey};
use crate::entity::ServerEntity;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};

const COUNT_MASK: u64 = 0xFFFF_FFFF;

fn pack(epoch: u32, count: u32) -> u64 {
    (u64::from(epoch) << 32) | u64::from(count)
}

fn epoch_of(word: u64) -> u32 {
    (word >> 32) as u32
}

fn count_of(word: u64) -> u32 {
    (word & COUNT_MASK) as u32
}

/// Mutable part of a slot, only touched under `Slot::state`.
pub(crate) struct SlotState {
    pub(crate) exists: bool,
    pub(crate) config: Option<ConfigBlob>,
    pub(crate) instance: Option<Arc<dyn ServerEntity>>,
    pub(crate) created_at: Option<DateTime<Utc>>,
    /// Successful creates on this key so far
    pub(crate) incarnation: u64,
}

/// Copy of the introspectable slot fields, readable without `state`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SlotSummary {
    pub(crate) exists: bool,
    pub(crate) incarnation: u64,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) config_bytes: usize,
}

/// Per-key record in the registry.
///
/// Open handles are counted in one atomic word: the low half is the count,
/// the high half an epoch bumped whenever outstanding handles are detached.
/// The count is only incremented while `state` is held with `exists == true`;
/// releases decrement it lock-free and only if their epoch is still current.
///
/// `summary` mirrors `state` after every transition so that introspection
/// never waits behind a destroy draining handles.
pub(crate) struct Slot {
    key: EntityKey,
    state: Mutex<SlotState>,
    summary: std::sync::Mutex<SlotSummary>,
    handles: AtomicU64,
    drained: Notify,
}

impl Slot {
    pub(crate) fn new(key: EntityKey) -> Self {
        Self {
            key,
            state: Mutex::new(SlotState {
                exists: false,
                config: None,
                instance: None,
                created_at: None,
                incarnation: 0,
            }),
            summary: std::sync::Mutex::new(SlotSummary::default()),
            handles: AtomicU64::new(0),
            drained: Notify::new(),
        }
    }

    pub(crate) fn key(&self) -> &EntityKey {
        &self.key
    }

    pub(crate) fn state(&self) -> &Mutex<SlotState> {
        &self.state
    }

    pub(crate) fn summary(&self) -> SlotSummary {
        *self.summary.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `state` as the current summary. Caller holds `state`.
    pub(crate) fn publish(&self, state: &SlotState) {
        *self.summary.lock().unwrap_or_else(|e| e.into_inner()) = SlotSummary {
            exists: state.exists,
            incarnation: state.incarnation,
            created_at: state.created_at,
            config_bytes: state.config.as_ref().map_or(0, ConfigBlob::len),
        };
    }

    pub(crate) fn open_handles(&self) -> usize {
        count_of(self.handles.load(Ordering::SeqCst)) as usize
    }

    /// Count one more open handle and return the epoch it belongs to.
    ///
    /// Caller must hold `state` and have observed `exists == true`.
    pub(crate) fn acquire(&self) -> u32 {
        epoch_of(self.handles.fetch_add(1, Ordering::SeqCst))
    }

    /// Drop one open handle of `epoch`. Handles detached by a newer epoch
    /// are ignored. Wakes drain waiters when the count reaches zero.
    pub(crate) fn release(&self, epoch: u32) -> bool {
        let released = self
            .handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                (epoch_of(word) == epoch && count_of(word) > 0).then(|| word - 1)
            });

        match released {
            Ok(previous) => {
                if count_of(previous) == 1 {
                    self.drained.notify_waiters();
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Forget every open handle and wake any drain waiter. Returns how many
    /// were detached.
    pub(crate) fn detach_all(&self) -> usize {
        let previous = self
            .handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                Some(pack(epoch_of(word).wrapping_add(1), 0))
            })
            .unwrap_or_else(|word| word);

        self.drained.notify_waiters();
        count_of(previous) as usize
    }

    /// Wait until no handles are open. Caller holds `state`, so no new
    /// handle can be acquired meanwhile.
    pub(crate) async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.open_handles() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl SlotState {
    pub(crate) fn clear(&mut self) -> Option<Arc<dyn ServerEntity>> {
        self.exists = false;
        self.config = None;
        self.created_at = None;
        self.instance.take()
    }
}
