//! Shared value types for dot1x.
//!
//! This crate defines the small vocabulary every other layer speaks:
//!
//! - **Identity** ([`SessionKey`], [`MacAddress`], [`AttachmentPoint`]) —
//!   where a supplicant is plugged in and who it claims to be.
//! - **Correlation** ([`CorrelationId`]) — the one-byte tag that links an
//!   outstanding request to the authentication server's reply.
//! - **Events** ([`AuthEvent`], [`AuthEventKind`]) — the lifecycle
//!   notifications handed to downstream enforcement logic.
//! - **Errors** ([`TypesError`]) — what can go wrong when parsing them.
//!
//! # Architecture
//!
//! ```text
//! Facade (dot1x) → Reaper (timeouts) → Session (state machine) → Types
//! ```
//!
//! Nothing in here knows about state machines or timers. These are plain
//! data types with serde support so they can be logged, stored, or put on
//! a wire by whatever sits above.

mod error;
mod types;

pub use error::TypesError;
pub use types::{
    AttachmentPoint, AuthEvent, AuthEventKind, CorrelationId, MacAddress,
    SessionKey,
};
