//! `AuthService` builder and lifecycle.
//!
//! This is the entry point for running dot1x inside a larger process. It
//! ties the layers together: one [`SessionRegistry`], one
//! [`CleanupScheduler`] reaping from it, the event sink, and the
//! statistics hook.

use std::sync::Arc;

use dot1x_reaper::{CleanupScheduler, ReaperConfig, ReaperMetrics, TimeoutCounter, TimeoutStats};
use dot1x_session::{AuthEventSink, Session, SessionRegistry};
use serde::{Deserialize, Serialize};

use crate::Dot1xError;

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Process-wide configuration.
///
/// Loadable from JSON; missing fields take their defaults, so `{}` is a
/// valid config.
///
/// ```json
/// { "reaper": { "cleanup_timeout_mins": 10 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub reaper: ReaperConfig,
}

impl ServiceConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// Returns [`Dot1xError::Config`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, Dot1xError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring an [`AuthService`].
///
/// # Example
///
/// ```rust,ignore
/// use dot1x::prelude::*;
///
/// let service = AuthService::builder()
///     .cleanup_timeout_mins(5)
///     .sink(my_sink)
///     .build();
/// ```
pub struct AuthServiceBuilder {
    config: ServiceConfig,
    sink: Option<Arc<dyn AuthEventSink>>,
    stats: Option<Arc<dyn TimeoutStats>>,
}

impl AuthServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            sink: None,
            stats: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the reaper's check interval.
    pub fn cleanup_timeout_mins(mut self, mins: u64) -> Self {
        self.config.reaper.cleanup_timeout_mins = mins;
        self
    }

    /// Sets the sink that receives lifecycle events.
    ///
    /// Optional here, but a sink must be in place (here or later through
    /// [`AuthService::registry`]) before the first event, or events fail
    /// with [`SessionError::SinkNotRegistered`](dot1x_session::SessionError::SinkNotRegistered).
    pub fn sink(mut self, sink: impl AuthEventSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the statistics hook. Defaults to a fresh [`TimeoutCounter`].
    pub fn stats(mut self, stats: Arc<dyn TimeoutStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Builds the service: initializes the registry, registers the sink,
    /// and creates the scheduler.
    pub fn build(self) -> AuthService {
        let registry = SessionRegistry::new();
        if let Some(sink) = self.sink {
            registry.set_sink(sink);
        }
        let stats = self
            .stats
            .unwrap_or_else(|| Arc::new(TimeoutCounter::new()));
        let scheduler = CleanupScheduler::new(
            registry.clone(),
            Arc::clone(&stats),
            self.config.reaper.clone(),
        );

        tracing::info!(
            cleanup_timeout_mins = self.config.reaper.cleanup_timeout_mins,
            sink = registry.has_sink(),
            "dot1x service initialized"
        );

        AuthService {
            registry,
            scheduler,
            config: self.config,
        }
    }
}

impl Default for AuthServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

/// A running dot1x service.
///
/// Packet-path entry points (`handle_start`, `handle_identity`, ...) live
/// in the handler module. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AuthService {
    pub(crate) registry: SessionRegistry,
    pub(crate) scheduler: CleanupScheduler,
    config: ServiceConfig,
}

impl AuthService {
    /// Creates a new builder.
    pub fn builder() -> AuthServiceBuilder {
        AuthServiceBuilder::new()
    }

    /// The session registry, for lookups and administrative deletion.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The cleanup scheduler.
    pub fn scheduler(&self) -> &CleanupScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Arms (or re-arms) the reaper for `session`. A previous timer for
    /// the same session is cancelled, so there is at most one per session.
    pub fn schedule_cleanup(&self, session: &Arc<Session>) {
        self.scheduler.schedule(session);
    }

    /// Snapshot of the reaper's metrics.
    pub fn reaper_metrics(&self) -> ReaperMetrics {
        self.scheduler.metrics()
    }

    /// Tears the service down: every pending cleanup timer is cancelled
    /// and the registry is emptied and closed. Idempotent.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        tracing::info!("dot1x service shut down");
    }
}
