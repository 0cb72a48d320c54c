//! Error types for the session layer.

use dot1x_types::SessionKey;

/// Errors that can occur during session management.
///
/// Note what is *not* here: a protocol-violating event is never an error.
/// The transition table always has an answer, and unexpected transitions
/// are reported through logs and [`Transition::sanctioned`](crate::Transition).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session is already registered under this key.
    /// Overwriting it would orphan the existing session's cleanup timer.
    #[error("session {0} already exists")]
    AlreadyExists(SessionKey),

    /// An event was applied before any [`AuthEventSink`](crate::AuthEventSink)
    /// was registered. This is a configuration error: downstream
    /// enforcement depends on every notification being delivered.
    #[error("no event sink registered")]
    SinkNotRegistered,

    /// The registry has been shut down.
    #[error("session registry is shut down")]
    RegistryClosed,
}
