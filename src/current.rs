//! # The currently running fiber.
//!
//! Everything here reads task-local storage set by the fiber wrapper on each
//! poll, so it works without a [`Coros`](crate::Coros) handle. Outside any
//! registry fiber (the thread's top-level context) the functions fall back to
//! per-thread "main" data: a `main<N>` log name, its own status string and its
//! own consuming flag.
//!
//! Stop-aware helpers ([`check_stop`], [`wait`], [`sleep`], [`yield_now`])
//! are the cooperative check-points fibers are expected to pass through.
//! On a top-level context they see no phase and never report a stop; use the
//! [`Coros`](crate::Coros) methods of the same names there.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{FiberError, Stop};
use crate::runtime::{next_stop, pending_stop, FiberRecord};

tokio::task_local! {
    static CURRENT: Rc<FiberRecord>;
}

static THREAD_SEQ: AtomicU64 = AtomicU64::new(0);

struct MainContext {
    name: String,
    status: RefCell<String>,
    consuming: Cell<bool>,
}

thread_local! {
    static MAIN: MainContext = MainContext {
        name: format!("main{}", THREAD_SEQ.fetch_add(1, Ordering::Relaxed)),
        status: RefCell::new(String::new()),
        consuming: Cell::new(false),
    };
}

/// Runs `fut` with `record` as the current fiber on every poll.
pub(crate) fn scope<F: Future>(record: Rc<FiberRecord>, fut: F) -> impl Future<Output = F::Output> {
    CURRENT.scope(record, fut)
}

pub(crate) fn record() -> Option<Rc<FiberRecord>> {
    CURRENT.try_with(Rc::clone).ok()
}

/// Registry name of the running fiber, or `""` on a top-level context.
pub fn name() -> String {
    record().map(|r| r.name().to_owned()).unwrap_or_default()
}

/// Like [`name`], but a top-level context reports `main<N>` (one number per thread).
pub fn log_name() -> String {
    match record() {
        Some(r) => r.name().to_owned(),
        None => MAIN.with(|m| m.name.clone()),
    }
}

/// True when not running inside a registry fiber.
pub fn on_main_context() -> bool {
    record().is_none()
}

/// Diagnostic status of the current context.
pub fn status() -> String {
    match record() {
        Some(r) => r.status(),
        None => MAIN.with(|m| m.status.borrow().clone()),
    }
}

/// Sets the diagnostic status of the current context.
pub fn set_status(status: impl Into<String>) {
    let status = status.into();
    match record() {
        Some(r) => r.set_status(status),
        None => MAIN.with(|m| *m.status.borrow_mut() = status),
    }
}

/// Scoped status: sets a status and restores the previous one on drop.
///
/// ```
/// use coros::current::{self, TempStatus};
///
/// current::set_status("idle");
/// {
///     let _s = TempStatus::new("loading");
///     assert_eq!(current::status(), "loading");
/// }
/// assert_eq!(current::status(), "idle");
/// ```
#[must_use = "the previous status is restored when the guard drops"]
pub struct TempStatus {
    old: String,
}

impl TempStatus {
    pub fn new(status: impl Into<String>) -> Self {
        let old = self::status();
        set_status(status);
        Self { old }
    }
}

impl Drop for TempStatus {
    fn drop(&mut self) {
        set_status(std::mem::take(&mut self.old));
    }
}

/// Whether the current context consumes the events it waits for.
///
/// Most fibers don't, so every listener on a channel sees each event. The
/// flag is read by event-pump collaborators; the registry only stores it.
pub fn consuming() -> bool {
    match record() {
        Some(r) => r.consuming(),
        None => MAIN.with(|m| m.consuming.get()),
    }
}

pub fn set_consuming(consuming: bool) {
    match record() {
        Some(r) => r.set_consuming(consuming),
        None => MAIN.with(|m| m.consuming.set(consuming)),
    }
}

/// Scoped override of the consuming flag.
#[must_use = "the previous flag is restored when the guard drops"]
pub struct OverrideConsuming {
    prev: bool,
}

impl OverrideConsuming {
    pub fn new(consuming: bool) -> Self {
        let prev = self::consuming();
        set_consuming(consuming);
        Self { prev }
    }
}

impl Drop for OverrideConsuming {
    fn drop(&mut self) {
        set_consuming(self.prev);
    }
}

/// Cooperative check-point: returns the stop interrupt if this fiber must unwind.
///
/// Global phases outrank a pending kill request. On a top-level context there
/// is no fiber record to read the phase from, so this always returns `Ok`;
/// the main loop should call [`Coros::check_stop`](crate::Coros::check_stop)
/// instead, which also reports `Stopping`, `Stopped` and `Shutdown` there.
pub fn check_stop() -> Result<(), Stop> {
    match record().and_then(|r| pending_stop(Some(&*r), r.phase())) {
        Some(stop) => Err(stop),
        None => Ok(()),
    }
}

/// Like [`check_stop`], but runs `cleanup` before reporting the stop.
///
/// If `cleanup` fails, its error is returned instead of the stop interrupt.
pub fn check_stop_with<C>(cleanup: C) -> Result<(), FiberError>
where
    C: FnOnce() -> Result<(), FiberError>,
{
    match check_stop() {
        Ok(()) => Ok(()),
        Err(stop) => {
            cleanup()?;
            Err(stop.into())
        }
    }
}

/// Awaits `fut` unless the fiber is told to stop first.
pub async fn wait<F: Future>(fut: F) -> Result<F::Output, Stop> {
    let Some(rec) = record() else {
        return Ok(fut.await);
    };
    if let Some(stop) = pending_stop(Some(&*rec), rec.phase()) {
        return Err(stop);
    }
    tokio::select! {
        biased;
        stop = next_stop(&rec) => Err(stop),
        out = fut => Ok(out),
    }
}

/// Stop-aware sleep.
pub async fn sleep(duration: Duration) -> Result<(), Stop> {
    wait(tokio::time::sleep(duration)).await
}

/// Stop-aware scheduler yield: checks, yields once, checks again.
pub async fn yield_now() -> Result<(), Stop> {
    check_stop()?;
    tokio::task::yield_now().await;
    check_stop()
}
