//! Timeout reaper for dot1x sessions.
//!
//! A supplicant that starts authenticating and then goes quiet (or whose
//! authentication server never answers) would otherwise hold its session,
//! and its correlation ids, forever. The [`CleanupScheduler`] arms one
//! timer per session and evicts sessions that have stalled.
//!
//! # Staleness rule
//!
//! Every armed session is checked once per full `timeout`. A check reaps
//! the session iff it is still `Started` or `Pending` *and* nothing has
//! been heard from it for more than `timeout / 2`. Otherwise the timer
//! re-arms for another full `timeout`.
//!
//! Checking once per interval instead of tracking exact deadlines keeps
//! the cost at one timer per session. The price is detection latency: a
//! session that goes silent just after `timeout / 2` before a check
//! survives that check (it is not yet stale) and is only reaped at the
//! next one, up to `1.5 × timeout` after its last message.
//!
//! # Integration
//!
//! ```ignore
//! let scheduler = CleanupScheduler::new(registry.clone(), stats, ReaperConfig::default());
//!
//! // On every EAPOL start / RADIUS request for a session:
//! session.touch();
//! scheduler.schedule(&session);
//! ```
//!
//! Resolution (`authorize_access` / `deny_access`) cancels the timer
//! through the registry; nothing else needs to be called.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dot1x_session::{Session, SessionRegistry, SessionState, StaleCheck};
use dot1x_types::SessionKey;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the cleanup scheduler.
///
/// One process-wide value, set before traffic begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Interval between staleness checks, in minutes. A session must be
    /// silent for more than half of this to be reaped.
    pub cleanup_timeout_mins: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            cleanup_timeout_mins: Self::DEFAULT_TIMEOUT_MINS,
        }
    }
}

impl ReaperConfig {
    /// Default check interval.
    pub const DEFAULT_TIMEOUT_MINS: u64 = 10;

    /// Create a config with a specific interval.
    pub fn with_timeout_mins(cleanup_timeout_mins: u64) -> Self {
        Self {
            cleanup_timeout_mins,
        }
    }

    /// Longest supported check interval: one week.
    pub const MAX_TIMEOUT_MINS: u64 = 7 * 24 * 60;

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`CleanupScheduler::new`]. Rules:
    /// - A zero interval would make every timer fire immediately and
    ///   forever; it is raised to one minute.
    /// - Intervals above [`Self::MAX_TIMEOUT_MINS`] are capped, so timer
    ///   deadlines always fit the clock.
    pub fn validated(mut self) -> Self {
        if self.cleanup_timeout_mins == 0 {
            warn!("cleanup_timeout_mins is 0, raising to 1");
            self.cleanup_timeout_mins = 1;
        }
        if self.cleanup_timeout_mins > Self::MAX_TIMEOUT_MINS {
            warn!(
                mins = self.cleanup_timeout_mins,
                max = Self::MAX_TIMEOUT_MINS,
                "cleanup_timeout_mins exceeds maximum, clamping"
            );
            self.cleanup_timeout_mins = Self::MAX_TIMEOUT_MINS;
        }
        self
    }

    /// The check interval as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_mins.saturating_mul(60))
    }
}

// ---------------------------------------------------------------------------
// Statistics hook
// ---------------------------------------------------------------------------

/// The statistics collaborator the reaper reports into.
///
/// Only one counter is fed from here: a session reaped while `Pending`
/// with a request in flight means the authentication server never
/// answered, which counts as a timed-out packet.
pub trait TimeoutStats: Send + Sync + 'static {
    fn increase_timed_out_packets(&self);
}

/// A plain atomic implementation of [`TimeoutStats`].
#[derive(Debug, Default)]
pub struct TimeoutCounter {
    timed_out_packets: AtomicU64,
}

impl TimeoutCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timed_out_packets(&self) -> u64 {
        self.timed_out_packets.load(Ordering::Relaxed)
    }
}

impl TimeoutStats for TimeoutCounter {
    fn increase_timed_out_packets(&self) {
        self.timed_out_packets.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the scheduler.
///
/// `stray_checks` is the one to watch: it counts timers that fired for a
/// key no longer registered, which means a cancellation was missed
/// somewhere upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaperMetrics {
    /// Timers that fired and ran a check.
    pub checks: u64,
    /// Sessions evicted as stale.
    pub reaped: u64,
    /// Checks that found the session healthy and re-armed.
    pub rearmed: u64,
    /// Checks that found no session under the key.
    pub stray_checks: u64,
    /// Checks that stood down because a newer timer or a resolution
    /// had taken over the session's slot.
    pub superseded: u64,
}

#[derive(Default)]
struct MetricCounters {
    checks: AtomicU64,
    reaped: AtomicU64,
    rearmed: AtomicU64,
    stray_checks: AtomicU64,
    superseded: AtomicU64,
}

impl MetricCounters {
    fn snapshot(&self) -> ReaperMetrics {
        ReaperMetrics {
            checks: self.checks.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
            rearmed: self.rearmed.load(Ordering::Relaxed),
            stray_checks: self.stray_checks.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Arms and runs per-session cleanup timers.
///
/// Cheap to clone; clones share the same registry, stats sink and
/// metrics. Timers are Tokio tasks, so [`schedule`](Self::schedule) must
/// be called from within a Tokio runtime.
#[derive(Clone)]
pub struct CleanupScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SessionRegistry,
    stats: Arc<dyn TimeoutStats>,
    timeout: Duration,
    metrics: MetricCounters,
}

impl CleanupScheduler {
    /// Create a scheduler reaping from `registry` and reporting to `stats`.
    pub fn new(
        registry: SessionRegistry,
        stats: Arc<dyn TimeoutStats>,
        config: ReaperConfig,
    ) -> Self {
        let config = config.validated();
        debug!(
            timeout_mins = config.cleanup_timeout_mins,
            "cleanup scheduler created"
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                stats,
                timeout: config.timeout(),
                metrics: MetricCounters::default(),
            }),
        }
    }

    /// The configured check interval.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> ReaperMetrics {
        self.inner.metrics.snapshot()
    }

    /// Arms a cleanup timer for `session`, one full interval from now.
    ///
    /// Any timer already armed for the session is cancelled first, so a
    /// session never has more than one live timer no matter how often
    /// this is called.
    pub fn schedule(&self, session: &Arc<Session>) {
        if !self.inner.registry.is_open() {
            debug!(session_key = %session.key(), "registry closed — not arming cleanup timer");
            return;
        }
        let key = session.key().clone();
        session.arm_cleanup(|generation| self.spawn_check(key, generation));
        trace!(session_key = %session.key(), "cleanup timer armed");
    }

    /// Cancels the session's timer, if any. Idempotent.
    pub fn cancel(&self, session: &Session) {
        session.cancel_cleanup();
    }

    fn spawn_check(&self, key: SessionKey, generation: u64) -> AbortHandle {
        let this = self.clone();
        let deadline = Instant::now() + self.inner.timeout;
        tokio::spawn(async move {
            time::sleep_until(deadline).await;
            this.check(&key, generation);
        })
        .abort_handle()
    }

    /// One staleness check for the timer `generation` armed under `key`.
    fn check(&self, key: &SessionKey, generation: u64) {
        let metrics = &self.inner.metrics;
        bump(&metrics.checks);

        let Some(session) = self.inner.registry.lookup_by_key(key) else {
            // Should have been cancelled when the session resolved or was
            // deleted. Harmless, but frequent occurrences mean a missed
            // cancellation.
            bump(&metrics.stray_checks);
            warn!(session_key = %key, "session not found for cleanup timer");
            return;
        };

        let registry = &self.inner.registry;
        let outcome = session.reap_if_stale(generation, self.inner.timeout / 2, || {
            registry.evict(&session)
        });

        match outcome {
            StaleCheck::Reaped {
                state,
                idle,
                waiting,
            } => {
                if state == SessionState::Pending && waiting {
                    self.inner.stats.increase_timed_out_packets();
                }
                bump(&metrics.reaped);
                info!(
                    session_key = %key,
                    %state,
                    idle_secs = idle.as_secs(),
                    "reaped stalled session"
                );
            }
            StaleCheck::Superseded => {
                bump(&metrics.superseded);
                debug!(session_key = %key, "cleanup timer superseded, standing down");
            }
            StaleCheck::Fresh { state, idle } => {
                let rearmed = registry.is_open()
                    && session.rearm_cleanup(generation, |next| {
                        self.spawn_check(key.clone(), next)
                    });
                if rearmed {
                    bump(&metrics.rearmed);
                    trace!(
                        session_key = %key,
                        %state,
                        idle_secs = idle.as_secs(),
                        "session not stale, re-armed"
                    );
                } else {
                    bump(&metrics.superseded);
                    debug!(session_key = %key, "cleanup timer superseded, not re-arming");
                }
            }
        }
    }
}
