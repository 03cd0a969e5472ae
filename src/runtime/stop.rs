//! # Cooperative cancellation and the stop-listener bridge.
//!
//! A fiber is never interrupted from outside. It learns it must unwind either
//! at a check-point (`check_stop`, or any stop-aware wait) or because the
//! resource it is blocked on was closed by a [`StopListener`] cleanup.
//!
//! ## Stop listener
//! ```text
//! stop_listener(caller, cleanup) ──► local listener task
//!        │                              ├─ phase leaves Running ─┐
//!        │                              ├─ consumer killed ──────┼─► cleanup() once
//!        ▼                              └─ handle dropped ───────┴─► exit, no cleanup
//!   StopListener (DropGuard)
//! ```

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::phase::{stopping, Phase};
use super::record::FiberRecord;
use crate::error::Stop;
use crate::events::{Bus, Event, EventKind};

/// The stop a fiber should raise now, if any. Global phases outrank a kill.
pub(crate) fn pending_stop(record: Option<&FiberRecord>, phase: Phase) -> Option<Stop> {
    phase
        .as_stop()
        .or_else(|| record.and_then(|r| r.killed_by()).map(|by| Stop::Killed { by }))
}

/// Resolves with the first stop that applies to `record`.
pub(crate) async fn next_stop(record: &FiberRecord) -> Stop {
    let kill = record.kill_token();
    let mut phase = record.phase_receiver();
    tokio::select! {
        Some(_) = stopping(&mut phase) => {}
        _ = kill.cancelled() => {}
    }
    pending_stop(Some(record), record.phase()).unwrap_or(Stop::Shutdown)
}

/// Connection between a waitable resource and the registry's stop signals.
///
/// Keep it alive as long as the resource exists; dropping it (or calling
/// [`disconnect`](StopListener::disconnect)) unsubscribes without running the
/// cleanup.
#[must_use = "dropping a StopListener disconnects it immediately"]
pub struct StopListener {
    caller: String,
    fired: watch::Receiver<bool>,
    guard: DropGuard,
}

impl StopListener {
    pub(crate) fn spawn<C>(
        local: &tokio::task::LocalSet,
        bus: Bus,
        caller: String,
        mut phase: watch::Receiver<Phase>,
        consumer: Option<(String, CancellationToken)>,
        cleanup: C,
    ) -> Self
    where
        C: FnOnce() + 'static,
    {
        let token = CancellationToken::new();
        let (fired_tx, fired) = watch::channel(false);
        let conn = token.clone();
        let label = caller.clone();

        local.spawn_local(async move {
            let (consumer_name, kill) = match consumer {
                Some((name, kill)) => (Some(name), Some(kill)),
                None => (None, None),
            };
            let killed = async {
                match &kill {
                    Some(k) => k.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            let reason = tokio::select! {
                biased;
                _ = conn.cancelled() => return,
                Some(p) = stopping(&mut phase) => p.as_label(),
                _ = killed => "killed",
            };
            tracing::debug!(caller = %label, consumer = ?consumer_name, reason, "stop listener firing");
            cleanup();
            let _ = fired_tx.send(true);
            let mut ev = Event::new(EventKind::StopListenerFired).with_reason(label.as_str());
            if let Some(name) = consumer_name {
                ev = ev.with_fiber(name);
            }
            bus.publish(ev);
        });

        Self {
            caller,
            fired,
            guard: token.drop_guard(),
        }
    }

    /// Label passed when the listener was registered.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// True once the cleanup has run.
    pub fn has_fired(&self) -> bool {
        *self.fired.borrow()
    }

    /// True until the listener fires or is disconnected.
    pub fn is_connected(&self) -> bool {
        !self.has_fired() && self.fired.has_changed().is_ok()
    }

    /// Unsubscribes without running the cleanup.
    pub fn disconnect(self) {
        drop(self.guard);
    }
}

impl std::fmt::Debug for StopListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopListener")
            .field("caller", &self.caller)
            .field("fired", &self.has_fired())
            .finish()
    }
}
