//! The session registry: every live session, indexed two ways.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating sessions when a new attachment point is seen
//! - Finding a session by key (packet from the supplicant side) or by
//!   correlation id (reply from the authentication server)
//! - Allocating correlation ids
//! - Applying protocol events and notifying the event sink
//! - Dropping sessions on explicit deletion, resolution, or shutdown
//!
//! # Concurrency note
//!
//! Unlike a single-owner manager, the registry is shared by every
//! packet-processing task and every reaper timer at once. Both indexes
//! are `DashMap`s (sharded locks, no global lock), the id counter has its
//! own mutex, and [`SessionRegistry`] itself is a cheap `Arc` clone.
//! What the registry does *not* do is order events on the same session:
//! callers serialize those by session key.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dot1x_types::{AuthEvent, AuthEventKind, CorrelationId, MacAddress, SessionKey};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::fsm::{SessionEvent, Transition};
use crate::{AuthEventSink, Session, SessionError};

/// Counter value the allocator starts from after `new()`.
const INITIAL_COUNTER: u8 = 1;

/// Tracks every active supplicant session.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ start() ──→ request_access() ──→ authorize_access() ──→ logoff()
///    │            │                                deny_access()          │
///    │            └─ id allocated, by_id += 1         └─ by_id purged     │
///    ▼                                                                    ▼
/// [by_key]  ─────────────── stays registered ──────────────────────→ delete_by_key()
/// ```
///
/// `new()` is the explicit init; [`shutdown`](Self::shutdown) is the
/// explicit teardown. Separate registries share nothing, so tests can
/// run as many as they like side by side.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    /// Primary index. Survives resolution; only explicit deletion removes
    /// an entry.
    by_key: DashMap<SessionKey, Arc<Session>>,

    /// Secondary index for matching server replies. A session may own
    /// several entries (one per `start()`) until it resolves.
    by_id: DashMap<CorrelationId, Arc<Session>>,

    /// Last value handed out, before the `+ 2` offset. Guarded so two
    /// sessions can never draw the same id in one pass.
    counter: Mutex<u8>,

    /// Times an allocated id displaced an entry owned by another session.
    aliased_ids: AtomicU64,

    sink: RwLock<Option<Arc<dyn AuthEventSink>>>,

    open: AtomicBool,
}

impl SessionRegistry {
    /// Creates an empty, open registry with no sink registered.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                by_key: DashMap::new(),
                by_id: DashMap::new(),
                counter: Mutex::new(INITIAL_COUNTER),
                aliased_ids: AtomicU64::new(0),
                sink: RwLock::new(None),
                open: AtomicBool::new(true),
            }),
        }
    }

    // =====================================================================
    // Event sink
    // =====================================================================

    /// Registers the sink that receives every lifecycle notification,
    /// replacing any previous one.
    pub fn set_sink(&self, sink: Arc<dyn AuthEventSink>) {
        *self.shared.sink.write() = Some(sink);
    }

    /// Unregisters `sink`, but only if it is the one currently registered.
    /// A stale owner unsetting late can't knock out its replacement.
    pub fn unset_sink(&self, sink: &Arc<dyn AuthEventSink>) {
        let mut current = self.shared.sink.write();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, sink)) {
            *current = None;
        }
    }

    pub fn has_sink(&self) -> bool {
        self.shared.sink.read().is_some()
    }

    /// Fails fast if events can't be delivered. Checked *before* any state
    /// changes so a misconfigured registry never half-applies an event.
    fn ready_sink(&self) -> Result<Arc<dyn AuthEventSink>, SessionError> {
        if !self.is_open() {
            return Err(SessionError::RegistryClosed);
        }
        match self.shared.sink.read().as_ref() {
            Some(sink) => Ok(Arc::clone(sink)),
            None => {
                error!("session event fired with no event sink registered");
                Err(SessionError::SinkNotRegistered)
            }
        }
    }

    // =====================================================================
    // Index management
    // =====================================================================

    /// Registers a new Idle session under `key`.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyExists`] if `key` is taken. The existing
    ///   session is left alone, cleanup timer included.
    /// - [`SessionError::RegistryClosed`] after [`shutdown`](Self::shutdown).
    pub fn create(
        &self,
        key: impl Into<SessionKey>,
    ) -> Result<Arc<Session>, SessionError> {
        if !self.is_open() {
            return Err(SessionError::RegistryClosed);
        }
        let key = key.into();

        match self.shared.by_key.entry(key.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(key)),
            Entry::Vacant(slot) => {
                let session = Arc::new(Session::new(key));
                slot.insert(Arc::clone(&session));
                info!(session_key = %session.key(), "creating a new session");
                Ok(session)
            }
        }
    }

    /// Looks up a session by its key. `None` is an ordinary outcome.
    pub fn lookup_by_key(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.shared.by_key.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Looks up the session that owns correlation id `id`.
    pub fn lookup_by_id(&self, id: CorrelationId) -> Option<Arc<Session>> {
        self.shared.by_id.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Removes `key` from the key index only.
    ///
    /// Correlation entries and the cleanup timer are untouched; a timer
    /// that fires later finds nothing and stands down.
    pub fn delete_by_key(&self, key: &SessionKey) -> Option<Arc<Session>> {
        let removed = self.shared.by_key.remove(key).map(|(_, s)| s);
        if removed.is_some() {
            debug!(session_key = %key, "session deleted by key");
        }
        removed
    }

    /// Removes the *first* session whose supplicant address is `mac`, from
    /// both indexes, and cancels its timer.
    ///
    /// Stops after one match even if several sessions share the address.
    /// Map iteration order is unspecified, so which one goes is too.
    pub fn delete_by_address(&self, mac: MacAddress) -> Option<Arc<Session>> {
        // Match on a snapshot: session fields are never read under a shard
        // lock, since the reaper takes them in the opposite order.
        let session = self
            .sessions()
            .into_iter()
            .find(|s| s.supplicant_address() == Some(mac))?;

        self.shared
            .by_key
            .remove_if(session.key(), |_, current| Arc::ptr_eq(current, &session))?;
        self.purge_correlation_entries(&session);
        info!(session_key = %session.key(), %mac, "session deleted by supplicant address");
        Some(session)
    }

    /// Removes every correlation entry that points at `session` and
    /// cancels its pending cleanup task.
    ///
    /// Called when a session resolves. The key index is left alone so
    /// a later logoff still finds the session.
    pub fn purge_correlation_entries(&self, session: &Arc<Session>) {
        self.shared
            .by_id
            .retain(|_, owner| !Arc::ptr_eq(owner, session));
        session.cancel_cleanup();
    }

    /// Removes `session` from both indexes and cancels its timer.
    ///
    /// The key entry is only removed if it still points at this very
    /// session; a replacement registered under the same key survives.
    pub fn evict(&self, session: &Arc<Session>) {
        self.shared
            .by_key
            .remove_if(session.key(), |_, current| Arc::ptr_eq(current, session));
        self.purge_correlation_entries(session);
    }

    /// Hands out the next correlation id and maps it to `session`.
    ///
    /// Ids cycle through `2..=254` with period 253; 0 and 1 are never
    /// produced. The mapping is in place before the id is returned.
    ///
    /// With more than 251 sessions mid-exchange at once, a fresh id can
    /// land on one still held by another session. The newer session wins
    /// the entry; the event is logged and counted in
    /// [`aliased_identifier_count`](Self::aliased_identifier_count).
    pub fn allocate_identifier(&self, session: &Arc<Session>) -> CorrelationId {
        let mut counter = self.shared.counter.lock();
        *counter = (*counter + 1) % CorrelationId::SPAN;
        let id = CorrelationId(*counter + CorrelationId::MIN);

        if let Some(previous) = self.shared.by_id.insert(id, Arc::clone(session)) {
            if !Arc::ptr_eq(&previous, session) {
                self.shared.aliased_ids.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %id,
                    session_key = %session.key(),
                    displaced = %previous.key(),
                    "correlation id reused while still mapped to another session"
                );
            }
        }
        id
    }

    /// Number of allocations that displaced another session's entry.
    pub fn aliased_identifier_count(&self) -> u64 {
        self.shared.aliased_ids.load(Ordering::Relaxed)
    }

    /// A snapshot of every registered session.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.shared
            .by_key
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Number of sessions in the key index.
    pub fn len(&self) -> usize {
        self.shared.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.by_key.is_empty()
    }

    /// Number of live correlation entries.
    pub fn correlation_entry_count(&self) -> usize {
        self.shared.by_id.len()
    }

    // =====================================================================
    // Protocol events
    // =====================================================================

    /// The supplicant started authentication.
    ///
    /// Applies `Start`, notifies `STARTED`, then assigns a fresh correlation
    /// id. Earlier ids stay mapped until the session resolves.
    pub fn start(&self, session: &Arc<Session>) -> Result<Transition, SessionError> {
        let sink = self.ready_sink()?;
        let transition = session.apply(SessionEvent::Start);
        sink.notify(AuthEvent::new(
            AuthEventKind::Started,
            session.attachment_point(),
        ));

        let id = self.allocate_identifier(session);
        session.set_correlation_id(id);
        debug!(session_key = %session.key(), %id, "correlation id assigned");

        Ok(transition)
    }

    /// The supplicant identified itself; a request goes upstream.
    pub fn request_access(
        &self,
        session: &Arc<Session>,
    ) -> Result<Transition, SessionError> {
        let sink = self.ready_sink()?;
        let transition = session.apply(SessionEvent::RequestAccess);
        sink.notify(AuthEvent::new(
            AuthEventKind::Requested,
            session.attachment_point(),
        ));
        Ok(transition)
    }

    /// The authentication server accepted the supplicant.
    ///
    /// After notifying `APPROVED`, every correlation entry for the session
    /// is purged and its cleanup timer cancelled.
    pub fn authorize_access(
        &self,
        session: &Arc<Session>,
    ) -> Result<Transition, SessionError> {
        self.resolve(session, SessionEvent::AuthorizeAccess, AuthEventKind::Approved)
    }

    /// The authentication server rejected the supplicant. Same cleanup as
    /// [`authorize_access`](Self::authorize_access).
    pub fn deny_access(
        &self,
        session: &Arc<Session>,
    ) -> Result<Transition, SessionError> {
        self.resolve(session, SessionEvent::DenyAccess, AuthEventKind::Denied)
    }

    /// The supplicant logged off. No notification is emitted.
    ///
    /// Still requires a registered sink, like every other event, so a
    /// misconfiguration surfaces on the first event of any kind.
    pub fn logoff(&self, session: &Arc<Session>) -> Result<Transition, SessionError> {
        self.ready_sink()?;
        Ok(session.apply(SessionEvent::Logoff))
    }

    fn resolve(
        &self,
        session: &Arc<Session>,
        event: SessionEvent,
        kind: AuthEventKind,
    ) -> Result<Transition, SessionError> {
        let sink = self.ready_sink()?;
        let transition = session.apply(event);
        sink.notify(AuthEvent::new(kind, session.attachment_point()));
        self.purge_correlation_entries(session);
        Ok(transition)
    }

    // =====================================================================
    // Lifecycle
    // =====================================================================

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Tears the registry down: cancels every pending cleanup task, empties
    /// both indexes, and drops the sink. Further `create` calls and events
    /// fail with [`SessionError::RegistryClosed`].
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }

        for entry in self.shared.by_key.iter() {
            entry.value().cancel_cleanup();
        }
        for entry in self.shared.by_id.iter() {
            entry.value().cancel_cleanup();
        }
        let sessions = self.shared.by_key.len();
        self.shared.by_key.clear();
        self.shared.by_id.clear();
        *self.shared.sink.write() = None;

        info!(sessions, "session registry shut down");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
