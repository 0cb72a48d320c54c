//! The authentication state machine as data.
//!
//! Two tables drive every session:
//!
//! - [`next`] — the *transition table*. Total: every `(state, event)` pair
//!   has a successor, so applying an event can never fail.
//! - [`is_sanctioned`] — the *diagnostic table*. Marks the handful of
//!   pairs that are part of the normal 802.1X sequence. Everything else
//!   still moves through [`next`], it just gets logged as unexpected.
//!
//! ```text
//!   Idle ──Start──→ Started ──RequestAccess──→ Pending ──AuthorizeAccess──→ Authorized
//!    ↑                 ↑                          │                            │
//!    │                 │                          └──DenyAccess──→ Unauthorized│
//!    │                 │                                               │       │
//!    │                 └───────────────── Start ───────────────────────┴───────┤
//!    └──────────────────────────────────── Logoff ─────────────────────────────┘
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a supplicant is in the authentication exchange.
///
/// The discriminants double as row indexes into the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Logged off, or never started.
    Idle = 0,
    /// The supplicant announced itself (EAPOL start).
    Started = 1,
    /// The supplicant identified itself; waiting on the auth server.
    Pending = 2,
    /// The auth server accepted the supplicant.
    Authorized = 3,
    /// The auth server rejected the supplicant.
    Unauthorized = 4,
}

impl SessionState {
    /// Every state, in table order.
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Started,
        Self::Pending,
        Self::Authorized,
        Self::Unauthorized,
    ];

    /// Returns `true` once the auth server has answered, either way.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Authorized | Self::Unauthorized)
    }

    /// Returns `true` for the states in which a silent session can be
    /// reaped by the cleanup timer.
    pub fn is_timeout_eligible(self) -> bool {
        matches!(self, Self::Started | Self::Pending)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Started => write!(f, "STARTED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Authorized => write!(f, "AUTHORIZED"),
            Self::Unauthorized => write!(f, "UNAUTHORIZED"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// An input to the state machine.
///
/// The discriminants double as column indexes into the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    Start = 0,
    RequestAccess = 1,
    AuthorizeAccess = 2,
    DenyAccess = 3,
    Logoff = 4,
}

impl SessionEvent {
    /// Every event, in table order.
    pub const ALL: [Self; 5] = [
        Self::Start,
        Self::RequestAccess,
        Self::AuthorizeAccess,
        Self::DenyAccess,
        Self::Logoff,
    ];
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::RequestAccess => write!(f, "REQUEST ACCESS"),
            Self::AuthorizeAccess => write!(f, "AUTHORIZE ACCESS"),
            Self::DenyAccess => write!(f, "DENY ACCESS"),
            Self::Logoff => write!(f, "LOGOFF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

use SessionState::{Authorized, Idle, Pending, Started, Unauthorized};

/// Row = current state, column = event.
const TRANSITIONS: [[SessionState; 5]; 5] = [
    //  Start     RequestAccess  AuthorizeAccess  DenyAccess    Logoff
    [Started, Idle, Idle, Idle, Idle],
    [Started, Pending, Started, Started, Started],
    [Pending, Pending, Authorized, Unauthorized, Pending],
    [Started, Authorized, Authorized, Authorized, Idle],
    [Started, Unauthorized, Unauthorized, Unauthorized, Idle],
];

/// Looks up the successor of `state` under `event`.
///
/// Pure and total: there is no pair without an answer.
pub fn next(state: SessionState, event: SessionEvent) -> SessionState {
    TRANSITIONS[state as usize][event as usize]
}

/// Returns `true` if `(state, event)` is part of the normal protocol
/// sequence. Only affects logging; [`next`] is applied either way.
pub fn is_sanctioned(state: SessionState, event: SessionEvent) -> bool {
    use SessionEvent::*;

    matches!(
        (state, event),
        (Idle, Start)
            | (Started, RequestAccess)
            | (Pending, AuthorizeAccess)
            | (Pending, DenyAccess)
            | (Authorized, Logoff)
            | (Unauthorized, Logoff)
            | (Authorized, Start)
            | (Unauthorized, Start)
    )
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// The outcome of applying one event to a session.
///
/// Callers that only care about the permissive behavior can ignore it.
/// Callers that want strict validation check [`sanctioned`](Self::sanctioned):
/// `false` means the event was applied even though the protocol didn't
/// expect it from `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub event: SessionEvent,
    pub sanctioned: bool,
}

impl Transition {
    /// Computes the transition without applying it anywhere.
    pub fn compute(from: SessionState, event: SessionEvent) -> Self {
        Self {
            from,
            to: next(from, event),
            event,
            sanctioned: is_sanctioned(from, event),
        }
    }

    /// Returns `true` if the state actually changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}
