//! # LogWriter: tracing-backed event writer
//!
//! A subscriber that turns registry events into `tracing` records, one line
//! per event with structured fields.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG coros: launched fiber="fetch1"
//! WARN  coros: failed fiber="fetch1" reason="execution failed: boom"
//! INFO  coros: phase changed phase=Stopping
//! DEBUG coros: stopped fiber="poller3" reason="stop_stopping"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let fiber = e.fiber.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::FiberLaunched => tracing::debug!(target: "coros", fiber, "launched"),
            EventKind::FiberFinished => tracing::debug!(target: "coros", fiber, "finished"),
            EventKind::FiberStopped => {
                tracing::debug!(target: "coros", fiber, reason, "stopped")
            }
            EventKind::FiberFailed => tracing::warn!(target: "coros", fiber, reason, "failed"),
            EventKind::FiberDropped => tracing::debug!(target: "coros", fiber, "dropped"),
            EventKind::KillRequested => {
                tracing::info!(target: "coros", fiber, by = reason, "kill requested")
            }
            EventKind::PhaseChanged => {
                tracing::info!(target: "coros", phase = ?e.phase, "phase changed")
            }
            EventKind::StopListenerFired => {
                tracing::debug!(target: "coros", consumer = fiber, caller = reason, "stop listener fired")
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "coros", subscriber = fiber, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "coros", subscriber = fiber, info = reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
