//! Registry of voice sessions keyed by room, with observer pub/sub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use playhub_common::RoomKey;
use tracing::debug;

use crate::identity::IdentityProvider;
use crate::signaling::SignalingChannel;

use super::media::MediaEngine;
use super::session::{spawn_listener, MediaSession, SessionDeps};
use super::types::{RoomState, RoomStatePatch, SessionConfig};

type Observer = Arc<dyn Fn(&RoomState) + Send + Sync>;

// ---------------------------------------------------------------------------
// Room cell
// ---------------------------------------------------------------------------

/// State of one room plus its observers. Every change is delivered to
/// every observer synchronously, in publish order.
pub(crate) struct RoomCell {
    state: Mutex<RoomState>,
    observers: Mutex<Vec<(u64, Observer)>>,
    // Serializes deliveries across threads; reentrant so an observer may
    // publish from inside its callback.
    delivery: ReentrantMutex<()>,
    next_id: AtomicU64,
}

impl RoomCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RoomState::default()),
            observers: Mutex::new(Vec::new()),
            delivery: ReentrantMutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn snapshot(&self) -> RoomState {
        self.state.lock().clone()
    }

    pub(crate) fn publish(&self, patch: RoomStatePatch) {
        self.publish_with(|state| patch.apply(state));
    }

    pub(crate) fn publish_with(&self, update: impl FnOnce(&mut RoomState)) {
        let _delivery = self.delivery.lock();
        update(&mut self.state.lock());
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            let state = self.snapshot();
            observer(&state);
        }
    }

    /// Register `observer` and hand it the current state right away.
    fn add_observer(&self, observer: Observer) -> u64 {
        let _delivery = self.delivery.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::clone(&observer)));
        let state = self.snapshot();
        observer(&state);
        id
    }

    /// Returns the number of observers left.
    fn remove_observer(&self, id: u64) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct StoreInner {
    deps: SessionDeps,
    rooms: Mutex<HashMap<RoomKey, Arc<MediaSession>>>,
}

impl StoreInner {
    fn unsubscribe(&self, key: &RoomKey, id: u64) {
        let evicted = {
            let mut rooms = self.rooms.lock();
            let Some(session) = rooms.get(key) else { return };
            let remaining = session.cell().remove_observer(id);
            if RoomSessionStore::retains(remaining, &session.state()) {
                None
            } else {
                rooms.remove(key)
            }
        };
        if let Some(session) = evicted {
            debug!(room = %key, "last observer gone, room released");
            session.shutdown();
        }
    }
}

/// Owns one [`MediaSession`] per room key.
///
/// Cheap to clone; clones share the registry. A room is created on first
/// access and released once it has no observers and is not joined.
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct RoomSessionStore {
    inner: Arc<StoreInner>,
}

impl RoomSessionStore {
    pub fn new(
        channel: SignalingChannel,
        engine: Arc<dyn MediaEngine>,
        identity: Arc<dyn IdentityProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                deps: SessionDeps {
                    channel,
                    engine,
                    identity,
                    config,
                },
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether a room with `observers` observers in `state` is kept.
    pub fn retains(observers: usize, state: &RoomState) -> bool {
        observers > 0 || state.joined
    }

    /// The session for `key`, created idle if absent.
    pub fn get_or_create(&self, key: impl Into<RoomKey>) -> Arc<MediaSession> {
        let key = key.into();
        let mut rooms = self.inner.rooms.lock();
        if let Some(session) = rooms.get(&key) {
            return Arc::clone(session);
        }
        let session = Arc::new(MediaSession::new(key.clone(), self.inner.deps.clone()));
        spawn_listener(&session);
        debug!(room = %key, "room created");
        rooms.insert(key, Arc::clone(&session));
        session
    }

    pub fn get(&self, key: &RoomKey) -> Option<Arc<MediaSession>> {
        self.inner.rooms.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &RoomKey) -> bool {
        self.inner.rooms.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe `key`. The callback receives the current state immediately
    /// and again after every change, until the subscription is dropped.
    pub fn subscribe<F>(&self, key: impl Into<RoomKey>, observer: F) -> Subscription
    where
        F: Fn(&RoomState) + Send + Sync + 'static,
    {
        let key = key.into();
        let session = self.get_or_create(key.clone());
        let id = session.cell().add_observer(Arc::new(observer));
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            active: true,
        }
    }

    /// Merge `patch` into the room's state. Returns `false` if the room
    /// does not exist.
    pub fn publish(&self, key: &RoomKey, patch: RoomStatePatch) -> bool {
        self.publish_with(key, |state| patch.apply(state))
    }

    pub fn publish_with(&self, key: &RoomKey, update: impl FnOnce(&mut RoomState)) -> bool {
        let Some(session) = self.get(key) else {
            return false;
        };
        session.cell().publish_with(update);
        true
    }

    /// Release every room the retention policy no longer keeps.
    pub fn sweep(&self) -> usize {
        let evicted: Vec<Arc<MediaSession>> = {
            let mut rooms = self.inner.rooms.lock();
            let doomed: Vec<RoomKey> = rooms
                .iter()
                .filter(|(_, s)| !Self::retains(s.cell().observer_count(), &s.state()))
                .map(|(key, _)| key.clone())
                .collect();
            doomed.iter().filter_map(|key| rooms.remove(key)).collect()
        };
        for session in &evicted {
            debug!(room = %session.key(), "room swept");
            session.shutdown();
        }
        evicted.len()
    }
}

/// Observer registration; unsubscribes on drop.
pub struct Subscription {
    store: Weak<StoreInner>,
    key: RoomKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
