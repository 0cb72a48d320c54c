//! Supplicant session tracking for dot1x.
//!
//! This crate handles the lifecycle of one port-based authentication
//! attempt:
//!
//! 1. **Protocol ordering** — a total transition table ([`fsm`]) that
//!    decides every next state, plus a side table that decides which
//!    transitions are worth a warning
//! 2. **Session tracking** — one [`Session`] per attachment point, held in
//!    a [`SessionRegistry`] indexed by session key and by correlation id
//! 3. **Notifications** — every accepted event is reported to an injected
//!    [`AuthEventSink`]
//! 4. **Cleanup hooks** — a [`CleanupHandle`] slot per session so a timer
//!    layer above can reap stalled sessions
//!
//! # How it fits in the stack
//!
//! ```text
//! Reaper Layer (above)  ← arms timers, evicts stalled sessions
//!     ↕
//! Session Layer (this crate)  ← state machine + registry
//!     ↕
//! Types Layer (below)  ← SessionKey, CorrelationId, AuthEvent
//! ```

pub mod fsm;

mod cleanup;
mod error;
mod registry;
mod session;
mod sink;

pub use cleanup::CleanupHandle;
pub use error::SessionError;
pub use fsm::{SessionEvent, SessionState, Transition};
pub use registry::SessionRegistry;
pub use session::{Session, StaleCheck};
pub use sink::AuthEventSink;
