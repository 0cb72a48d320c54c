//! Delivery hook for session lifecycle notifications.
//!
//! The session layer doesn't decide what happens when a supplicant is
//! approved or denied (opening a port, installing flows, counting). It
//! reports the fact to an [`AuthEventSink`] and moves on.
//!
//! The sink is injected into the [`SessionRegistry`](crate::SessionRegistry)
//! and must be registered before the first event fires.

use dot1x_types::AuthEvent;
use tokio::sync::mpsc;

/// Receives lifecycle notifications from sessions.
///
/// # Trait bounds
///
/// - `Send + Sync` → events fire from whichever task is processing a
///   packet, possibly many at once.
/// - `'static` → the sink lives as long as the registry holding it.
///
/// `notify` is synchronous and must not block: it runs inline on the
/// packet path. Sinks that need to do real work should hand the event
/// off to a channel, which is exactly what the provided
/// [`mpsc::UnboundedSender`] impl does.
///
/// # Example
///
/// ```rust
/// use dot1x_session::AuthEventSink;
/// use dot1x_types::AuthEvent;
///
/// struct LogSink;
///
/// impl AuthEventSink for LogSink {
///     fn notify(&self, event: AuthEvent) {
///         println!("{} at {:?}", event.kind, event.attachment_point);
///     }
/// }
/// ```
pub trait AuthEventSink: Send + Sync + 'static {
    /// Delivers one notification.
    fn notify(&self, event: AuthEvent);
}

/// Forwards events into a channel. A closed channel means the consumer
/// went away; the event is dropped with a warning rather than failing the
/// state machine.
impl AuthEventSink for mpsc::UnboundedSender<AuthEvent> {
    fn notify(&self, event: AuthEvent) {
        if let Err(err) = self.send(event) {
            tracing::warn!(kind = %err.0.kind, "event sink receiver dropped");
        }
    }
}
