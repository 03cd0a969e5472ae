//! # Lifecycle events emitted by the fiber registry.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Fiber events**: launch and the three ways a fiber can end
//! - **Control events**: kill requests, phase changes, stop listeners firing
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries metadata such as timestamps, fiber name,
//! reasons and the application phase.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use coros::{Event, EventKind, Phase};
//!
//! let ev = Event::new(EventKind::PhaseChanged)
//!     .with_phase(Phase::Stopping)
//!     .with_reason("teardown");
//!
//! assert_eq!(ev.kind, EventKind::PhaseChanged);
//! assert_eq!(ev.phase, Some(Phase::Stopping));
//! assert_eq!(ev.reason.as_deref(), Some("teardown"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::runtime::Phase;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of registry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Fiber events ===
    /// A fiber was registered and is about to run.
    ///
    /// Sets: `fiber`
    FiberLaunched,

    /// The fiber body returned `Ok(())`.
    ///
    /// Sets: `fiber`
    FiberFinished,

    /// The fiber unwound because of a stop interrupt (not relayed).
    ///
    /// Sets: `fiber`, `reason` (stop label)
    FiberStopped,

    /// The fiber body failed or panicked; the error was queued for the main context.
    ///
    /// Sets: `fiber`, `reason` (error message)
    FiberFailed,

    /// The fiber future was dropped before completing (registry torn down).
    ///
    /// Sets: `fiber`
    FiberDropped,

    // === Control events ===
    /// A kill was requested for a live fiber.
    ///
    /// Sets: `fiber` (target), `reason` (requester log name)
    KillRequested,

    /// The application phase advanced.
    ///
    /// Sets: `phase`
    PhaseChanged,

    /// A stop listener ran its cleanup.
    ///
    /// Sets: `fiber` (consumer, if scoped), `reason` (caller label)
    StopListenerFired,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `fiber` (subscriber name), `reason` (panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `fiber` (subscriber name), `reason` ("full" / "closed")
    SubscriberOverflow,
}

/// Registry event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the fiber (or subscriber), if applicable.
    pub fiber: Option<Arc<str>>,
    /// Human-readable reason (errors, requester, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Application phase, for `PhaseChanged`.
    pub phase: Option<Phase>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            fiber: None,
            reason: None,
            phase: None,
        }
    }

    /// Attaches a fiber name.
    #[inline]
    pub fn with_fiber(mut self, fiber: impl Into<Arc<str>>) -> Self {
        self.fiber = Some(fiber.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the application phase.
    #[inline]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_fiber(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_fiber(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
