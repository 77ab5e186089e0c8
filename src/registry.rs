//! Instance registry, the single source of truth for instance state
//!
//! Maps instance keys to a slot holding the `ConnectionRecord`, the engine
//! handle and the current session number. Every operation is a short,
//! synchronous critical section: nothing here awaits engine I/O.
//!
//! Locking: the outer map is behind a `RwLock` that is only written when a
//! key is inserted or removed. Each slot has its own `Mutex`, so merges for
//! the same key serialize while different keys proceed independently.

use crate::engine::EngineHandle;
use crate::types::{ConnectionRecord, InstancePatch};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

struct Slot {
    record: ConnectionRecord,
    handle: Option<Arc<dyn EngineHandle>>,
    /// Session that currently owns this slot's callbacks
    session: u64,
    /// A start has claimed `session` but not yet attached its handle
    starting: bool,
}

/// Outcome of `InstanceRegistry::claim_start`
pub enum StartClaim {
    /// No record for this key
    Missing,
    /// A live session already exists
    Live,
    /// Another start is in flight
    InFlight,
    /// Caller owns `session` and must complete or abort it
    Claimed {
        session: u64,
        /// Handle left behind by a disconnected session; caller closes it
        stale: Option<Arc<dyn EngineHandle>>,
    },
}

/// A record removed from the registry, with the handle it owned
pub struct RemovedInstance {
    pub record: ConnectionRecord,
    pub handle: Option<Arc<dyn EngineHandle>>,
}

/// Process-wide instance registry
#[derive(Default)]
pub struct InstanceRegistry {
    slots: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
    next_session: AtomicU64,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a record
    pub fn get(&self, key: &str) -> Option<ConnectionRecord> {
        self.slot(key).map(|slot| lock(&slot).record.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slot(key).is_some()
    }

    /// Snapshots of all records (order unspecified)
    pub fn list(&self) -> Vec<ConnectionRecord> {
        let slots: Vec<_> = read(&self.slots).values().cloned().collect();
        slots.iter().map(|slot| lock(slot).record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        read(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge a patch, creating a fresh record if the key is absent
    pub fn upsert(&self, key: &str, patch: &InstancePatch) -> ConnectionRecord {
        let slot = self.slot_or_insert(key, || ConnectionRecord::new(key));
        let mut slot = lock(&slot);
        slot.record.apply(patch);
        slot.record.clone()
    }

    /// Insert `record` unless its key exists; returns the stored record and
    /// whether it was created
    pub fn insert_if_absent(&self, record: ConnectionRecord) -> (ConnectionRecord, bool) {
        let key = record.instance_key.clone();
        let mut created = false;
        let slot = self.slot_or_insert(&key, || {
            created = true;
            record
        });
        let stored = lock(&slot).record.clone();
        (stored, created)
    }

    /// Merge a patch into an existing record only
    pub fn update(&self, key: &str, patch: &InstancePatch) -> Option<ConnectionRecord> {
        let slot = self.slot(key)?;
        let mut slot = lock(&slot);
        slot.record.apply(patch);
        Some(slot.record.clone())
    }

    /// Atomic read-modify-write scoped to a session
    ///
    /// Returns `None` when the key is gone or `session` was superseded.
    pub fn modify<T>(
        &self,
        key: &str,
        session: u64,
        f: impl FnOnce(&mut ConnectionRecord) -> T,
    ) -> Option<T> {
        let slot = self.slot(key)?;
        let mut slot = lock(&slot);
        if slot.session != session {
            return None;
        }
        Some(f(&mut slot.record))
    }

    /// Remove a record, returning it with its handle
    pub fn remove(&self, key: &str) -> Option<RemovedInstance> {
        let slot = write(&self.slots).remove(key)?;
        let mut slot = lock(&slot);
        // Invalidate the session so a detached worker stops writing
        slot.session = 0;
        Some(RemovedInstance {
            record: slot.record.clone(),
            handle: slot.handle.take(),
        })
    }

    /// Clone of the engine handle, if any
    pub fn handle(&self, key: &str) -> Option<Arc<dyn EngineHandle>> {
        self.slot(key).and_then(|slot| lock(&slot).handle.clone())
    }

    /// Handle owned by `session`, if it is still current
    pub fn session_handle(&self, key: &str, session: u64) -> Option<Arc<dyn EngineHandle>> {
        let slot = self.slot(key)?;
        let slot = lock(&slot);
        if slot.session != session {
            return None;
        }
        slot.handle.clone()
    }

    /// Claim the right to open a new engine session for `key`
    pub fn claim_start(&self, key: &str) -> StartClaim {
        let Some(slot) = self.slot(key) else {
            return StartClaim::Missing;
        };
        let mut slot = lock(&slot);

        if slot.starting {
            return StartClaim::InFlight;
        }
        if slot.handle.is_some() && slot.record.status.is_live() {
            return StartClaim::Live;
        }

        slot.session = self.next_session();
        slot.starting = true;
        StartClaim::Claimed {
            session: slot.session,
            stale: slot.handle.take(),
        }
    }

    /// Attach the handle created for a claimed session
    ///
    /// Returns `false` (and attaches nothing) if the session was superseded
    /// or the record removed while the handle was being created.
    pub fn complete_start(&self, key: &str, session: u64, handle: Arc<dyn EngineHandle>) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };
        let mut slot = lock(&slot);
        if slot.session != session {
            return false;
        }
        slot.starting = false;
        slot.handle = Some(handle);
        true
    }

    /// Release a claim after handle creation failed
    pub fn abort_start(&self, key: &str, session: u64) {
        if let Some(slot) = self.slot(key) {
            let mut slot = lock(&slot);
            if slot.session == session {
                slot.starting = false;
            }
        }
    }

    /// Detach the handle of `session` (engine-initiated close)
    pub fn release_handle(&self, key: &str, session: u64) -> Option<Arc<dyn EngineHandle>> {
        let slot = self.slot(key)?;
        let mut slot = lock(&slot);
        if slot.session != session {
            return None;
        }
        slot.handle.take()
    }

    /// Detach the handle regardless of session
    pub fn take_handle(&self, key: &str) -> Option<Arc<dyn EngineHandle>> {
        self.slot(key).and_then(|slot| lock(&slot).handle.take())
    }

    /// Reset a record to its configuration fields and retire its session
    ///
    /// Returns the reset record and the detached handle.
    pub fn reset(&self, key: &str) -> Option<(ConnectionRecord, Option<Arc<dyn EngineHandle>>)> {
        let slot = self.slot(key)?;
        let mut slot = lock(&slot);
        slot.record.reset_to_config();
        slot.session = self.next_session();
        slot.starting = false;
        let handle = slot.handle.take();
        Some((slot.record.clone(), handle))
    }

    fn next_session(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn slot(&self, key: &str) -> Option<Arc<Mutex<Slot>>> {
        read(&self.slots).get(key).cloned()
    }

    fn slot_or_insert(
        &self,
        key: &str,
        init: impl FnOnce() -> ConnectionRecord,
    ) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        write(&self.slots)
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    record: init(),
                    handle: None,
                    session: 0,
                    starting: false,
                }))
            })
            .clone()
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
