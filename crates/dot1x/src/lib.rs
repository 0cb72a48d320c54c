//! # dot1x
//!
//! Session tracking for port-based network access control (802.1X with a
//! RADIUS-style authentication server).
//!
//! One state machine per supplicant, keyed by the switch port it is
//! plugged into. The crate enforces protocol ordering, hands out
//! correlation ids for server exchanges, reports lifecycle events to an
//! injected sink, and reaps sessions that stall.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dot1x::prelude::*;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), Dot1xError> {
//! dot1x::init_tracing();
//!
//! let (events, _rx) = mpsc::unbounded_channel::<AuthEvent>();
//! let service = AuthService::builder()
//!     .cleanup_timeout_mins(10)
//!     .sink(events)
//!     .build();
//!
//! let port = AttachmentPoint::new("of:0000000000000001", 3);
//! let mac: MacAddress = "02:00:00:00:00:01".parse()?;
//! let session = service.handle_start(&port, mac)?;
//! service.handle_identity(session.key(), b"alice".to_vec())?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod logging;
mod service;

pub use error::Dot1xError;
pub use logging::init_tracing;
pub use service::{AuthService, AuthServiceBuilder, ServiceConfig};

pub mod prelude {
    pub use crate::{AuthService, AuthServiceBuilder, Dot1xError, ServiceConfig};
    pub use dot1x_reaper::{
        CleanupScheduler, ReaperConfig, ReaperMetrics, TimeoutCounter, TimeoutStats,
    };
    pub use dot1x_session::{
        AuthEventSink, Session, SessionError, SessionEvent, SessionRegistry, SessionState,
        StaleCheck, Transition,
    };
    pub use dot1x_types::{
        AttachmentPoint, AuthEvent, AuthEventKind, CorrelationId, MacAddress, SessionKey,
        TypesError,
    };
}
