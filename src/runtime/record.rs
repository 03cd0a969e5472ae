//! Per-fiber control data.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::phase::Phase;

/// Control block for one live fiber. Owned by the registry; the running fiber
/// reaches it through task-local storage.
pub(crate) struct FiberRecord {
    name: String,
    status: RefCell<String>,
    consuming: Cell<bool>,
    killed_by: RefCell<Option<String>>,
    created: SystemTime,
    started: Instant,
    stack_size: usize,
    kill: CancellationToken,
    phase: watch::Receiver<Phase>,
}

impl FiberRecord {
    pub(crate) fn new(name: String, stack_size: usize, phase: watch::Receiver<Phase>) -> Self {
        Self {
            name,
            status: RefCell::new(String::new()),
            consuming: Cell::new(false),
            killed_by: RefCell::new(None),
            created: SystemTime::now(),
            started: Instant::now(),
            stack_size,
            kill: CancellationToken::new(),
            phase,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub(crate) fn set_status(&self, status: String) {
        *self.status.borrow_mut() = status;
    }

    pub(crate) fn consuming(&self) -> bool {
        self.consuming.get()
    }

    pub(crate) fn set_consuming(&self, consuming: bool) {
        self.consuming.set(consuming);
    }

    pub(crate) fn killed_by(&self) -> Option<String> {
        self.killed_by.borrow().clone()
    }

    /// Records the first kill request and wakes stop-aware waits.
    /// Returns the earlier requester if one was already recorded.
    pub(crate) fn kill(&self, by: String) -> Option<String> {
        let mut slot = self.killed_by.borrow_mut();
        if let Some(prev) = slot.as_ref() {
            return Some(prev.clone());
        }
        *slot = Some(by);
        drop(slot);
        self.kill.cancel();
        None
    }

    pub(crate) fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Phase of the registry that launched this fiber.
    pub(crate) fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub(crate) fn phase_receiver(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    pub(crate) fn info(&self) -> FiberInfo {
        FiberInfo {
            name: self.name.clone(),
            status: self.status(),
            consuming: self.consuming(),
            killed_by: self.killed_by(),
            created: self.created,
            age: self.started.elapsed(),
            stack_size: self.stack_size,
        }
    }
}

/// Read-only snapshot of a live fiber, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiberInfo {
    /// Registry name.
    pub name: String,
    /// Last status set by the fiber.
    pub status: String,
    /// Whether the fiber consumes the events it waits for.
    pub consuming: bool,
    /// Requester of a pending kill, if any.
    pub killed_by: Option<String>,
    /// Wall-clock launch time.
    pub created: SystemTime,
    /// Time since launch.
    pub age: Duration,
    /// Stack size in effect when the fiber was launched.
    pub stack_size: usize,
}
