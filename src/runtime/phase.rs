//! # Application phase.
//!
//! The registry owns one [`Phase`] value per thread. Teardown code advances it
//! `Running → Stopping → Stopped → Shutdown`; it never moves backwards. Every
//! phase past `Running` maps onto the matching [`Stop`] interrupt.

use tokio::sync::watch;

use crate::error::Stop;

/// Teardown progress of the application owning a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Normal operation.
    #[default]
    Running,
    /// Early shutdown stage.
    Stopping,
    /// Cleaning up.
    Stopped,
    /// Cleaned up.
    Shutdown,
}

impl Phase {
    /// The stop interrupt a fiber should raise in this phase, if any.
    pub fn as_stop(self) -> Option<Stop> {
        match self {
            Phase::Running => None,
            Phase::Stopping => Some(Stop::Stopping),
            Phase::Stopped => Some(Stop::Stopped),
            Phase::Shutdown => Some(Stop::Shutdown),
        }
    }

    /// True once teardown has begun.
    #[inline]
    pub fn is_stopping(self) -> bool {
        self > Phase::Running
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
            Phase::Shutdown => "shutdown",
        }
    }
}

/// Monotonic phase cell; readers can await changes.
pub(crate) struct PhaseCell {
    tx: watch::Sender<Phase>,
}

impl PhaseCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Running);
        Self { tx }
    }

    pub(crate) fn get(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Moves to `next` if it is later than the current phase.
    pub(crate) fn advance(&self, next: Phase) -> bool {
        self.tx.send_if_modified(|cur| {
            if next > *cur {
                *cur = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

/// Resolves once `rx` reports a phase past `Running`.
///
/// Returns `None` if the owning registry went away first.
pub(crate) async fn stopping(rx: &mut watch::Receiver<Phase>) -> Option<Phase> {
    rx.wait_for(|p| p.is_stopping()).await.ok().map(|p| *p)
}
