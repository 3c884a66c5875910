//! Ephemeral session store.
//!
//! Holds in-flight orchestration state in memory only — nothing is ever
//! persisted. Payloads are scrubbed through `Zeroize` on every removal
//! path: explicit completion, abort, TTL expiry, and the background sweep.
//!
//! Locking is two-level. The outer `RwLock` map guards slot bookkeeping and
//! is never held across an await. Each live slot carries its payload behind
//! a `tokio::sync::Mutex`; [`SessionStore::acquire`] hands out an owned
//! guard so a transition can hold exclusive access across its own awaits.
//! A second caller hitting the same session gets [`SessionStoreError::Busy`]
//! instead of queueing — transitions within one session are strictly
//! sequential and never waited on.
//!
//! Expired sessions leave a data-free tombstone behind so later callers can
//! tell `Expired` from `NotFound`; a subsequent sweep purges the tombstone
//! itself.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use zeroize::Zeroize;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("Session {0} has expired")]
    Expired(Uuid),

    #[error("Session {0} already has a transition in flight")]
    Busy(Uuid),

    #[error("Session {0} already exists")]
    Duplicate(Uuid),

    #[error("Session store lock poisoned")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// Slots
// ═══════════════════════════════════════════════════════════

enum SlotState<T> {
    Live(Arc<Mutex<T>>),
    /// Data-free marker left behind by TTL expiry.
    Tombstone,
}

struct Slot<T> {
    /// For live slots: when the session expires. For tombstones: when the
    /// marker itself may be purged.
    expires_at: Instant,
    state: SlotState<T>,
}

/// Counters from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Live sessions scrubbed and tombstoned this pass.
    pub expired: usize,
    /// Tombstones removed this pass.
    pub purged: usize,
}

// ═══════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════

/// TTL-bound in-memory store for zeroizable session payloads.
pub struct SessionStore<T> {
    slots: RwLock<HashMap<Uuid, Slot<T>>>,
    ttl: Duration,
}

impl<T> SessionStore<T>
where
    T: Zeroize + Send + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a new session under `id`.
    pub fn insert(&self, id: Uuid, payload: T) -> Result<(), SessionStoreError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        match slots.entry(id) {
            Entry::Occupied(_) => Err(SessionStoreError::Duplicate(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    expires_at: Instant::now() + self.ttl,
                    state: SlotState::Live(Arc::new(Mutex::new(payload))),
                });
                Ok(())
            }
        }
    }

    /// Take exclusive hold of a live session for one transition. The
    /// deadline set at insertion never moves; access does not extend it.
    /// Never blocks: a transition already in flight yields `Busy`. A session
    /// found past its TTL is scrubbed on the spot and reported as `Expired`.
    pub fn acquire(&self, id: &Uuid) -> Result<OwnedMutexGuard<T>, SessionStoreError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        let slot = slots.get_mut(id).ok_or(SessionStoreError::NotFound(*id))?;

        let payload = match &slot.state {
            SlotState::Tombstone => return Err(SessionStoreError::Expired(*id)),
            SlotState::Live(payload) => Arc::clone(payload),
        };

        let now = Instant::now();
        if now >= slot.expires_at {
            // Scrub in place before reporting the expiry. A held lock means
            // a transition is still running against the stale session; it
            // keeps exclusivity and the sweeper retries later.
            let Ok(mut guard) = payload.try_lock_owned() else {
                return Err(SessionStoreError::Busy(*id));
            };
            guard.zeroize();
            drop(guard);
            slot.state = SlotState::Tombstone;
            slot.expires_at = now + self.ttl;
            return Err(SessionStoreError::Expired(*id));
        }

        payload
            .try_lock_owned()
            .map_err(|_| SessionStoreError::Busy(*id))
    }

    /// Detach a slot entirely, live or tombstoned. Callers scrub the payload
    /// through their held guard first; the backing allocation is freed once
    /// the last guard drops. Returns whether the id was present.
    pub fn remove(&self, id: &Uuid) -> Result<bool, SessionStoreError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        Ok(slots.remove(id).is_some())
    }

    /// One TTL pass: scrub + tombstone live sessions past their deadline,
    /// purge tombstones past theirs.
    pub fn sweep(&self) -> Result<SweepStats, SessionStoreError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        let now = Instant::now();
        let mut stats = SweepStats::default();

        slots.retain(|_, slot| {
            let payload = match &slot.state {
                SlotState::Tombstone => {
                    if now >= slot.expires_at {
                        stats.purged += 1;
                        return false;
                    }
                    return true;
                }
                SlotState::Live(payload) => {
                    if now < slot.expires_at {
                        return true;
                    }
                    Arc::clone(payload)
                }
            };
            match payload.try_lock_owned() {
                Ok(mut guard) => {
                    guard.zeroize();
                    drop(guard);
                    slot.state = SlotState::Tombstone;
                    slot.expires_at = now + self.ttl;
                    stats.expired += 1;
                    true
                }
                // Transition still in flight; revisit next pass.
                Err(_) => true,
            }
        });

        if stats.expired + stats.purged > 0 {
            tracing::debug!(
                expired = stats.expired,
                purged = stats.purged,
                remaining = slots.len(),
                "session sweep"
            );
        }
        Ok(stats)
    }

    /// Spawn the background TTL sweeper. The task holds only a weak handle
    /// and exits once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                if let Err(e) = store.sweep() {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        })
    }

    /// Slot count, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn force_expire(&self, id: &Uuid) {
        let mut slots = self.slots.write().unwrap();
        if let Some(slot) = slots.get_mut(id) {
            slot.expires_at = Instant::now() - Duration::from_millis(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scratch {
        body: String,
    }

    impl Zeroize for Scratch {
        fn zeroize(&mut self) {
            self.body.zeroize();
        }
    }

    fn store() -> SessionStore<Scratch> {
        SessionStore::new(Duration::from_secs(60))
    }

    fn scratch(body: &str) -> Scratch {
        Scratch { body: body.into() }
    }

    #[tokio::test]
    async fn insert_acquire_round_trip() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("note")).unwrap();

        {
            let mut guard = store.acquire(&id).unwrap();
            guard.body.push_str(" extended");
        }

        let guard = store.acquire(&id).unwrap();
        assert_eq!(guard.body, "note extended");
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("a")).unwrap();
        assert!(matches!(
            store.insert(id, scratch("b")),
            Err(SessionStoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_acquire_is_busy_not_queued() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("held")).unwrap();

        let guard = store.acquire(&id).unwrap();
        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::Busy(_))
        ));
        drop(guard);
        assert!(store.acquire(&id).is_ok());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = store();
        assert!(matches!(
            store.acquire(&Uuid::new_v4()),
            Err(SessionStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn expiry_scrubs_and_leaves_tombstone() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("sensitive narrative")).unwrap();
        store.force_expire(&id);

        // First touch after the deadline scrubs and reports expiry.
        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::Expired(_))
        ));
        // The tombstone keeps answering Expired, not NotFound.
        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::Expired(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn acquire_does_not_extend_the_deadline() {
        let store = SessionStore::new(Duration::from_millis(300));
        let id = Uuid::new_v4();
        store.insert(id, scratch("timed")).unwrap();

        // A touch at 200 ms must not move the 300 ms deadline.
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(store.acquire(&id).unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn sweep_expires_then_purges() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("sweep me")).unwrap();
        store.force_expire(&id);

        let first = store.sweep().unwrap();
        assert_eq!(first, SweepStats { expired: 1, purged: 0 });
        assert_eq!(store.len(), 1);

        store.force_expire(&id);
        let second = store.sweep().unwrap();
        assert_eq!(second, SweepStats { expired: 0, purged: 1 });
        assert!(store.is_empty());

        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sweep_skips_sessions_with_a_transition_in_flight() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("busy")).unwrap();

        let guard = store.acquire(&id).unwrap();
        store.force_expire(&id);

        let stats = store.sweep().unwrap();
        assert_eq!(stats, SweepStats::default());
        assert_eq!(guard.body, "busy", "held payload must not be scrubbed");

        drop(guard);
        let stats = store.sweep().unwrap();
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn remove_detaches_live_session() {
        let store = store();
        let id = Uuid::new_v4();
        store.insert(id, scratch("done")).unwrap();

        let mut guard = store.acquire(&id).unwrap();
        guard.zeroize();
        assert!(store.remove(&id).unwrap());
        drop(guard);

        assert!(matches!(
            store.acquire(&id),
            Err(SessionStoreError::NotFound(_))
        ));
        assert!(!store.remove(&id).unwrap());
    }

    #[tokio::test]
    async fn background_sweeper_stops_with_the_store() {
        let store = Arc::new(SessionStore::<Scratch>::new(Duration::from_secs(60)));
        let handle = store.spawn_sweeper(Duration::from_millis(5));

        drop(store);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(handle.is_finished());
    }
}
