//! Session: one supplicant's authentication attempt.
//!
//! A session is the server's record of a supplicant plugged into one
//! port. It tracks:
//! - WHERE it is attached (`SessionKey`, `AttachmentPoint`)
//! - WHAT state the exchange is in (`SessionState`)
//! - WHICH correlation id its current exchange carries
//! - WHEN it was last heard from (so the reaper can tell it stalled)
//!
//! Sessions are shared as `Arc<Session>` between the two registry indexes
//! and the reaper, so all mutable fields sit behind a lock. The lock is
//! about memory safety, not protocol ordering: callers still serialize
//! events per session key.

use std::fmt;
use std::time::Duration;

use dot1x_types::{AttachmentPoint, CorrelationId, MacAddress, SessionKey};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::fsm::{SessionEvent, SessionState, Transition};
use crate::CleanupHandle;

/// Everything about a session that changes after creation.
#[derive(Debug)]
struct SessionData {
    state: SessionState,
    correlation_id: Option<CorrelationId>,

    // Opaque protocol payloads, copied verbatim to and from packets.
    challenge_id: u8,
    challenge_state: Vec<u8>,
    username: Vec<u8>,
    request_authenticator: Vec<u8>,

    // Supplicant connectivity, set by the caller once known.
    supplicant_address: Option<MacAddress>,
    attachment_point: Option<AttachmentPoint>,
    vlan_id: u16,
    priority_code: u8,

    /// A request to the authentication server is in flight.
    waiting_for_response: bool,
    /// Last time any protocol message for this session was seen.
    last_activity: Instant,
}

/// Outcome of [`Session::reap_if_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleCheck {
    /// The session was stale and has been evicted.
    Reaped {
        state: SessionState,
        idle: Duration,
        /// A request to the authentication server was still in flight.
        waiting: bool,
    },
    /// Not stale yet.
    Fresh { state: SessionState, idle: Duration },
    /// The checking task no longer owns the cleanup slot.
    Superseded,
}

/// A single supplicant's authentication session.
///
/// Created through [`SessionRegistry::create`](crate::SessionRegistry::create);
/// driven through the registry's event methods (`start`, `request_access`,
/// ...). Everything else on this type is attribute access.
pub struct Session {
    key: SessionKey,
    data: Mutex<SessionData>,
    /// The armed reaper task, if any. Kept in its own lock so timer
    /// bookkeeping never contends with attribute access.
    cleanup: Mutex<Option<CleanupHandle>>,
}

impl Session {
    pub(crate) fn new(key: SessionKey) -> Self {
        Self {
            key,
            data: Mutex::new(SessionData {
                state: SessionState::Idle,
                correlation_id: None,
                challenge_id: 0,
                challenge_state: Vec::new(),
                username: Vec::new(),
                request_authenticator: Vec::new(),
                supplicant_address: None,
                attachment_point: None,
                vlan_id: 0,
                priority_code: 0,
                waiting_for_response: false,
                last_activity: Instant::now(),
            }),
            cleanup: Mutex::new(None),
        }
    }

    /// Moves the session through the transition table.
    ///
    /// Never fails. Unexpected transitions are applied all the same and
    /// reported at `warn` level.
    pub(crate) fn apply(&self, event: SessionEvent) -> Transition {
        let transition = {
            let mut data = self.data.lock();
            let transition = Transition::compute(data.state, event);
            data.state = transition.to;
            transition
        };

        if transition.sanctioned {
            info!(
                session_key = %self.key,
                from = %transition.from,
                to = %transition.to,
                "moving from {} state to {} state",
                transition.from,
                transition.to,
            );
        } else {
            warn!(
                session_key = %self.key,
                state = %transition.from,
                next = %transition.to,
                "{} transition from this state is not allowed",
                event,
            );
        }

        transition
    }

    // -- Identity and protocol state --------------------------------------

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        self.data.lock().state
    }

    /// The correlation id assigned by the most recent `start`, or `None`
    /// if the session was never started.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.data.lock().correlation_id
    }

    pub(crate) fn set_correlation_id(&self, id: CorrelationId) {
        self.data.lock().correlation_id = Some(id);
    }

    // -- Opaque protocol payloads ------------------------------------------

    pub fn challenge_id(&self) -> u8 {
        self.data.lock().challenge_id
    }

    pub fn set_challenge_id(&self, challenge_id: u8) {
        info!(session_key = %self.key, challenge_id, "set challenge identifier");
        self.data.lock().challenge_id = challenge_id;
    }

    pub fn challenge_state(&self) -> Vec<u8> {
        self.data.lock().challenge_state.clone()
    }

    pub fn set_challenge_state(&self, challenge_state: Vec<u8>) {
        info!(session_key = %self.key, "set challenge state");
        self.data.lock().challenge_state = challenge_state;
    }

    /// Stores the identifier and state of an access challenge in one go,
    /// as they arrive together in the server's challenge.
    pub fn set_challenge_info(&self, challenge_id: u8, challenge_state: Vec<u8>) {
        let mut data = self.data.lock();
        data.challenge_id = challenge_id;
        data.challenge_state = challenge_state;
    }

    pub fn username(&self) -> Vec<u8> {
        self.data.lock().username.clone()
    }

    pub fn set_username(&self, username: Vec<u8>) {
        self.data.lock().username = username;
    }

    pub fn request_authenticator(&self) -> Vec<u8> {
        self.data.lock().request_authenticator.clone()
    }

    pub fn set_request_authenticator(&self, authenticator: Vec<u8>) {
        self.data.lock().request_authenticator = authenticator;
    }

    // -- Supplicant connectivity -------------------------------------------

    pub fn supplicant_address(&self) -> Option<MacAddress> {
        self.data.lock().supplicant_address
    }

    pub fn set_supplicant_address(&self, mac: MacAddress) {
        self.data.lock().supplicant_address = Some(mac);
    }

    pub fn attachment_point(&self) -> Option<AttachmentPoint> {
        self.data.lock().attachment_point.clone()
    }

    pub fn set_attachment_point(&self, point: AttachmentPoint) {
        self.data.lock().attachment_point = Some(point);
    }

    pub fn vlan_id(&self) -> u16 {
        self.data.lock().vlan_id
    }

    pub fn set_vlan_id(&self, vlan_id: u16) {
        self.data.lock().vlan_id = vlan_id;
    }

    pub fn priority_code(&self) -> u8 {
        self.data.lock().priority_code
    }

    pub fn set_priority_code(&self, priority_code: u8) {
        self.data.lock().priority_code = priority_code;
    }

    // -- Liveness -----------------------------------------------------------

    pub fn is_waiting_for_response(&self) -> bool {
        self.data.lock().waiting_for_response
    }

    pub fn set_waiting_for_response(&self, waiting: bool) {
        self.data.lock().waiting_for_response = waiting;
    }

    pub fn last_activity(&self) -> Instant {
        self.data.lock().last_activity
    }

    pub fn set_last_activity(&self, at: Instant) {
        self.data.lock().last_activity = at;
    }

    /// Records that a message for this session was just seen.
    pub fn touch(&self) {
        self.set_last_activity(Instant::now());
    }

    // -- Cleanup timer slot -------------------------------------------------

    /// Returns `true` while a reaper task is armed for this session.
    pub fn has_cleanup_handle(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// Arms a new cleanup task, cancelling whatever was armed before.
    ///
    /// `spawn` receives the generation reserved for the new task and
    /// returns its abort handle. It runs with the slot locked, so two
    /// concurrent calls can't both leave a live task behind.
    pub fn arm_cleanup(&self, spawn: impl FnOnce(u64) -> AbortHandle) {
        let mut slot = self.cleanup.lock();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let generation = CleanupHandle::next_generation();
        *slot = Some(CleanupHandle::new(generation, spawn(generation)));
    }

    /// Replaces the running task `generation` with a fresh one.
    ///
    /// Returns `false` (and spawns nothing) if `generation` no longer owns
    /// the slot: the session resolved, was deleted, or was re-armed by
    /// someone else while the old task was running.
    pub fn rearm_cleanup(
        &self,
        generation: u64,
        spawn: impl FnOnce(u64) -> AbortHandle,
    ) -> bool {
        let mut slot = self.cleanup.lock();
        if !matches!(slot.as_ref(), Some(h) if h.generation() == generation) {
            return false;
        }
        let next = CleanupHandle::next_generation();
        // The old handle belongs to the task calling us; dropping it
        // detaches without aborting.
        *slot = Some(CleanupHandle::new(next, spawn(next)));
        true
    }

    /// Clears the slot if task `generation` still owns it.
    ///
    /// Used by a firing task that is about to evict the session. Returns
    /// `false` if the task was superseded.
    pub fn release_cleanup(&self, generation: u64) -> bool {
        let mut slot = self.cleanup.lock();
        let owned = matches!(slot.as_ref(), Some(h) if h.generation() == generation);
        if owned {
            *slot = None;
        }
        owned
    }

    /// Settles one reaper check for task `generation` in a single critical
    /// section.
    ///
    /// The session counts as stale if its state is timeout-eligible and it
    /// has been silent for more than `max_idle`. A stale session whose slot
    /// `generation` still owns has its slot cleared and `evict` run, all
    /// with the session's fields locked, so no event can resolve it
    /// between the check and the eviction. `evict` must not read or write
    /// this session's fields.
    pub fn reap_if_stale(
        &self,
        generation: u64,
        max_idle: Duration,
        evict: impl FnOnce(),
    ) -> StaleCheck {
        let data = self.data.lock();
        let idle = Instant::now().saturating_duration_since(data.last_activity);
        if !(data.state.is_timeout_eligible() && idle > max_idle) {
            return StaleCheck::Fresh {
                state: data.state,
                idle,
            };
        }
        if !self.release_cleanup(generation) {
            return StaleCheck::Superseded;
        }
        evict();
        StaleCheck::Reaped {
            state: data.state,
            idle,
            waiting: data.waiting_for_response,
        }
    }

    /// Cancels and clears the armed task, if any. Safe to call repeatedly.
    pub fn cancel_cleanup(&self) {
        if let Some(handle) = self.cleanup.lock().take() {
            handle.cancel();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &data.state)
            .field("correlation_id", &data.correlation_id)
            .field("supplicant_address", &data.supplicant_address)
            .field("waiting_for_response", &data.waiting_for_response)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        let id = data
            .correlation_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        write!(
            f,
            "sessionKey: {}\tidentifier: {}\tstate: {}",
            self.key, id, data.state
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn session() -> Session {
        Session::new(SessionKey::new("of:1/1"))
    }

    #[test]
    fn test_new_session_is_idle_and_unassigned() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.correlation_id(), None);
        assert_eq!(s.supplicant_address(), None);
        assert!(!s.is_waiting_for_response());
        assert!(!s.has_cleanup_handle());
    }

    #[test]
    fn test_apply_unexpected_event_still_uses_table() {
        let s = session();

        let t = s.apply(SessionEvent::Logoff);

        assert!(!t.sanctioned);
        assert_eq!(t.to, SessionState::Idle);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_apply_sequence_reaches_authorized() {
        let s = session();
        s.apply(SessionEvent::Start);
        s.apply(SessionEvent::RequestAccess);
        let t = s.apply(SessionEvent::AuthorizeAccess);

        assert!(t.sanctioned);
        assert_eq!(s.state(), SessionState::Authorized);
    }

    #[test]
    fn test_payloads_are_stored_verbatim() {
        let s = session();
        s.set_challenge_info(9, vec![1, 2, 3]);
        s.set_username(b"alice".to_vec());
        s.set_request_authenticator(vec![0xff; 16]);

        assert_eq!(s.challenge_id(), 9);
        assert_eq!(s.challenge_state(), vec![1, 2, 3]);
        assert_eq!(s.username(), b"alice".to_vec());
        assert_eq!(s.request_authenticator(), vec![0xff; 16]);

        s.set_challenge_id(10);
        s.set_challenge_state(vec![4]);
        assert_eq!(s.challenge_id(), 10);
        assert_eq!(s.challenge_state(), vec![4]);
    }

    #[test]
    fn test_connectivity_attributes() {
        let s = session();
        s.set_supplicant_address(MacAddress([1, 2, 3, 4, 5, 6]));
        s.set_attachment_point(AttachmentPoint::new("of:1", 1));
        s.set_vlan_id(4094);
        s.set_priority_code(7);

        assert_eq!(s.supplicant_address(), Some(MacAddress([1, 2, 3, 4, 5, 6])));
        assert_eq!(s.attachment_point(), Some(AttachmentPoint::new("of:1", 1)));
        assert_eq!(s.vlan_id(), 4094);
        assert_eq!(s.priority_code(), 7);
    }

    #[test]
    fn test_display_format() {
        let s = session();
        assert_eq!(s.to_string(), "sessionKey: of:1/1\tidentifier: -\tstate: IDLE");

        s.set_correlation_id(CorrelationId(42));
        assert_eq!(s.to_string(), "sessionKey: of:1/1\tidentifier: 42\tstate: IDLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_moves_last_activity_forward() {
        let s = session();
        let before = s.last_activity();

        tokio::time::advance(Duration::from_secs(30)).await;
        s.touch();

        assert_eq!(s.last_activity() - before, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_cleanup_cancels_previous_task() {
        let s = session();
        let first = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        let first_abort = first.abort_handle();
        s.arm_cleanup(|_| first_abort);

        s.arm_cleanup(|_| {
            tokio::spawn(tokio::time::sleep(Duration::from_secs(60))).abort_handle()
        });

        assert!(first.await.unwrap_err().is_cancelled());
        assert!(s.has_cleanup_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_and_release_respect_generation() {
        let s = session();
        let mut armed = 0;
        s.arm_cleanup(|g| {
            armed = g;
            tokio::spawn(async {}).abort_handle()
        });

        // A stale generation can neither re-arm nor release.
        assert!(!s.rearm_cleanup(armed + 1_000_000, |_| unreachable!()));
        assert!(!s.release_cleanup(armed + 1_000_000));

        let mut rearmed = 0;
        assert!(s.rearm_cleanup(armed, |g| {
            rearmed = g;
            tokio::spawn(async {}).abort_handle()
        }));
        assert_ne!(rearmed, armed);

        // The superseded generation no longer owns the slot.
        assert!(!s.release_cleanup(armed));
        assert!(s.release_cleanup(rearmed));
        assert!(!s.has_cleanup_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_cleanup_is_idempotent() {
        let s = session();
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        let abort = task.abort_handle();
        s.arm_cleanup(|_| abort);

        s.cancel_cleanup();
        s.cancel_cleanup();

        assert!(!s.has_cleanup_handle());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    fn armed(s: &Session) -> u64 {
        let mut generation = 0;
        s.arm_cleanup(|g| {
            generation = g;
            tokio::spawn(async {}).abort_handle()
        });
        generation
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_if_stale_fresh_session_left_alone() {
        let s = session();
        s.apply(SessionEvent::Start);
        let generation = armed(&s);
        tokio::time::advance(Duration::from_secs(30)).await;

        let outcome = s.reap_if_stale(generation, Duration::from_secs(60), || unreachable!());

        assert!(matches!(outcome, StaleCheck::Fresh { state: SessionState::Started, .. }));
        assert!(s.has_cleanup_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_if_stale_idle_state_never_stale() {
        let s = session();
        let generation = armed(&s);
        tokio::time::advance(Duration::from_secs(3600)).await;

        let outcome = s.reap_if_stale(generation, Duration::from_secs(60), || unreachable!());

        assert!(matches!(outcome, StaleCheck::Fresh { state: SessionState::Idle, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_if_stale_superseded_generation_stands_down() {
        let s = session();
        s.apply(SessionEvent::Start);
        let old = armed(&s);
        armed(&s);
        tokio::time::advance(Duration::from_secs(61)).await;

        let outcome = s.reap_if_stale(old, Duration::from_secs(60), || unreachable!());

        assert_eq!(outcome, StaleCheck::Superseded);
        assert!(s.has_cleanup_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_if_stale_reports_waiting_request() {
        let s = session();
        s.apply(SessionEvent::Start);
        s.apply(SessionEvent::RequestAccess);
        s.set_waiting_for_response(true);
        let generation = armed(&s);
        tokio::time::advance(Duration::from_secs(61)).await;

        let mut evicted = false;
        let outcome = s.reap_if_stale(generation, Duration::from_secs(60), || evicted = true);

        assert!(evicted);
        assert_eq!(
            outcome,
            StaleCheck::Reaped {
                state: SessionState::Pending,
                idle: Duration::from_secs(61),
                waiting: true,
            }
        );
        assert!(!s.has_cleanup_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_if_stale_blocks_resolution_until_evicted() {
        let s = session();
        s.apply(SessionEvent::Start);
        s.apply(SessionEvent::RequestAccess);
        let generation = armed(&s);
        tokio::time::advance(Duration::from_secs(61)).await;

        let resolved = AtomicBool::new(false);
        let (s_ref, resolved_ref) = (&s, &resolved);
        let outcome = std::thread::scope(|scope| {
            s.reap_if_stale(generation, Duration::from_secs(60), move || {
                scope.spawn(move || {
                    s_ref.apply(SessionEvent::AuthorizeAccess);
                    resolved_ref.store(true, Ordering::SeqCst);
                });
                std::thread::sleep(std::time::Duration::from_millis(50));
                // The resolving thread is parked on the session lock.
                assert!(!resolved_ref.load(Ordering::SeqCst));
            })
        });

        assert!(matches!(outcome, StaleCheck::Reaped { state: SessionState::Pending, .. }));
        assert!(resolved.load(Ordering::SeqCst));
        assert_eq!(s.state(), SessionState::Authorized);
    }
}
