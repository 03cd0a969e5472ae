//! # Coros: registry of named cooperative fibers.
//!
//! [`Coros`] owns every fiber it launches: it names them, tracks their
//! control data, relays their failures to the main context, and coordinates
//! teardown through phases, kill requests and stop listeners.
//!
//! ## Architecture
//! ```text
//!  launch(prefix, body)
//!    ├─► Registry::generate_name(prefix)        "fetch" → "fetch1"
//!    ├─► Registry::insert(FiberRecord)
//!    ├─► publish FiberLaunched
//!    ├─► Primed::prime()  ── runs body to its first wait on this stack
//!    └─► LocalSet::spawn_local(rest)             (only if still pending)
//!
//!  fiber exit ─► toplevel ─► FiberFinished | FiberStopped | FiberFailed ─► ExceptionRelay
//!                        └─► Registry::remove(name)
//!
//!  main loop ─► rethrow() ─► oldest RelayedError (or Ok)
//!
//!  teardown ─► advance_phase(Stopping..Shutdown)
//!                ├─► stop-aware waits inside fibers return Err(Stop)
//!                └─► StopListener cleanups close queues / break promises
//! ```
//!
//! ## Rules
//! - One registry per thread; the handle is `Clone` but not `Send`.
//! - All mutation happens on the scheduling thread; no locks are taken.
//! - Cancellation is cooperative: a fiber that never checks and never blocks
//!   on a bridged resource cannot be stopped from outside.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::LocalSet;

use super::builder::SubscriberListener;
use super::phase::{stopping, Phase, PhaseCell};
use super::primed::Primed;
use super::record::{FiberInfo, FiberRecord};
use super::registry::Registry;
use super::relay::ExceptionRelay;
use super::stop::{pending_stop, StopListener};
use super::toplevel::toplevel;
use crate::config::CorosConfig;
use crate::current;
use crate::error::{FiberError, RelayedError, RuntimeError, Stop};
use crate::events::{Bus, Event, EventKind};

/// Shared state behind every [`Coros`] handle.
pub(crate) struct Inner {
    pub(crate) cfg: CorosConfig,
    pub(crate) registry: Registry,
    pub(crate) relay: ExceptionRelay,
    pub(crate) phase: PhaseCell,
    pub(crate) bus: Bus,
    pub(crate) exits: Notify,
    listener: RefCell<Option<SubscriberListener>>,
    stack_size: Cell<usize>,
    main_thread: ThreadId,
    local: LocalSet,
}

/// Handle to a per-thread fiber registry.
///
/// ## Example
/// ```
/// use coros::{current, Coros, CorosConfig, FiberError};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let coros = Coros::new(CorosConfig::default());
///     let c = coros.clone();
///     coros
///         .run_until(async move {
///             let name = c.launch("hello", || async {
///                 current::set_status("greeting");
///                 current::yield_now().await?;
///                 Ok::<(), FiberError>(())
///             });
///             assert_eq!(name, "hello1");
///             assert!(c.is_live(&name));
///
///             while !c.is_empty() {
///                 tokio::task::yield_now().await;
///             }
///             c.rethrow().expect("no failures");
///         })
///         .await;
/// }
/// ```
#[derive(Clone)]
pub struct Coros {
    inner: Rc<Inner>,
}

impl Coros {
    /// Creates a registry with no subscribers.
    ///
    /// Use [`Coros::builder`] to attach event subscribers.
    pub fn new(cfg: CorosConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self::from_parts(cfg, bus, None)
    }

    /// Starts a [`CorosBuilder`](crate::CorosBuilder).
    pub fn builder(cfg: CorosConfig) -> crate::CorosBuilder {
        crate::CorosBuilder::new(cfg)
    }

    pub(crate) fn from_parts(
        cfg: CorosConfig,
        bus: Bus,
        listener: Option<SubscriberListener>,
    ) -> Self {
        let stack_size = cfg.stack_size_or_default();
        Self {
            inner: Rc::new(Inner {
                cfg,
                registry: Registry::new(),
                relay: ExceptionRelay::default(),
                phase: PhaseCell::new(),
                bus,
                exits: Notify::new(),
                listener: RefCell::new(listener),
                stack_size: Cell::new(stack_size),
                main_thread: thread::current().id(),
                local: LocalSet::new(),
            }),
        }
    }

    /// Drives this registry's fibers while `fut` (the thread's main loop) runs.
    ///
    /// `fut` itself is a top-level context, not a fiber.
    pub async fn run_until<F: Future>(&self, fut: F) -> F::Output {
        self.inner.local.run_until(fut).await
    }

    /// Launches a fiber and runs it up to its first suspension.
    ///
    /// `prefix` is a suggestion; the returned name is the actual, unique one.
    /// The body must own everything it uses (`'static`); borrowing from the
    /// launching stack frame is impossible by construction.
    ///
    /// Never fails because of the body: errors and panics, even ones raised
    /// before the first suspension, are queued for [`rethrow`](Self::rethrow).
    ///
    /// Call from a thread that runs this registry (inside [`run_until`](Self::run_until)
    /// or from one of its fibers), so the rest of the fiber gets scheduled.
    ///
    /// A body that captures a `Coros` clone keeps the registry alive until it
    /// finishes; one that never finishes leaks the registry along with itself.
    /// Prefer the [`current`](crate::current) functions (`check_stop`, `wait`,
    /// `sleep`, `set_status`) inside bodies, and capture a handle only when the
    /// fiber must launch or kill other fibers.
    pub fn launch<F, Fut>(&self, prefix: &str, body: F) -> String
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), FiberError>> + 'static,
    {
        let inner = &self.inner;
        let name = inner.registry.generate_name(prefix);
        let record = Rc::new(FiberRecord::new(
            name.clone(),
            inner.stack_size.get(),
            inner.phase.subscribe(),
        ));
        inner.registry.insert(record.clone());
        inner
            .bus
            .publish(Event::new(EventKind::FiberLaunched).with_fiber(name.as_str()));
        tracing::debug!(fiber = %name, launcher = %current::log_name(), "launching fiber");

        let fiber = current::scope(record, toplevel(Rc::downgrade(inner), name.clone(), body));
        if let Some(pending) = Primed::new(Box::pin(fiber)).prime() {
            inner.local.spawn_local(pending);
        }
        name
    }

    /// Asks the named fiber to abort.
    ///
    /// Returns `true` if a live fiber was found. The fiber is not terminated
    /// here: its next check-point (or stop-aware wait) reports
    /// [`Stop::Killed`], and scoped stop listeners for it fire.
    pub fn request_kill(&self, name: &str) -> bool {
        let verbose = self.inner.cfg.verbose_kill_logging;
        let Some(record) = self.inner.registry.get(name) else {
            if verbose {
                tracing::debug!(fiber = name, "kill request for unknown fiber");
            }
            return false;
        };

        let by = current::log_name();
        match record.kill(by.clone()) {
            None => {
                tracing::info!(fiber = name, by = %by, "kill requested");
                self.inner.bus.publish(
                    Event::new(EventKind::KillRequested)
                        .with_fiber(name)
                        .with_reason(by),
                );
            }
            Some(prev) => {
                if verbose {
                    tracing::debug!(fiber = name, by = %by, first = %prev, "duplicate kill request");
                }
            }
        }
        true
    }

    /// Pops the oldest failure captured from a fiber.
    ///
    /// Call from the thread's top-level context, regularly (once per main-loop
    /// iteration). Returns `Ok(())` when nothing is pending.
    pub fn rethrow(&self) -> Result<(), RelayedError> {
        debug_assert!(
            current::on_main_context(),
            "rethrow() called from fiber {}",
            current::name()
        );
        self.inner.relay.drain_one()
    }

    /// Number of failures waiting for [`rethrow`](Self::rethrow).
    pub fn pending_failures(&self) -> usize {
        self.inner.relay.len()
    }

    /// Stack size for fibers launched after this call. Running fibers keep theirs.
    ///
    /// `0` restores [`CorosConfig::DEFAULT_STACK_SIZE`].
    pub fn set_stack_size(&self, bytes: usize) {
        let bytes = CorosConfig::effective_stack_size(bytes);
        tracing::info!(bytes, "setting fiber stack size");
        self.inner.stack_size.set(bytes);
    }

    pub fn stack_size(&self) -> usize {
        self.inner.stack_size.get()
    }

    /// True if `name` refers to a live fiber of this registry.
    pub fn is_live(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Number of live fibers.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted names of live fibers.
    pub fn names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Snapshot of every live fiber, sorted by name.
    pub fn snapshot(&self) -> Vec<FiberInfo> {
        self.inner.registry.snapshot()
    }

    /// Logs every live fiber with its status and age.
    pub fn print_active_coroutines(&self, when: &str) {
        let fibers = self.snapshot();
        tracing::info!(when, count = fibers.len(), "active fibers");
        for f in &fibers {
            tracing::info!(
                fiber = %f.name,
                status = %f.status,
                age = ?f.age,
                killed_by = ?f.killed_by,
                "active fiber"
            );
        }
    }

    /// True on this registry's owning thread, outside any fiber.
    pub fn on_main_thread_top_level(&self) -> bool {
        thread::current().id() == self.inner.main_thread && current::on_main_context()
    }

    /// Event bus carrying this registry's lifecycle events.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Current application phase.
    pub fn phase(&self) -> Phase {
        self.inner.phase.get()
    }

    /// Moves the application phase forward. Returns `false` if `phase` is not
    /// later than the current one (phases never regress).
    pub fn advance_phase(&self, phase: Phase) -> bool {
        if !self.inner.phase.advance(phase) {
            return false;
        }
        tracing::info!(phase = phase.as_label(), live = self.len(), "phase advanced");
        self.inner
            .bus
            .publish(Event::new(EventKind::PhaseChanged).with_phase(phase));
        true
    }

    /// Check-point usable from any context of this thread.
    ///
    /// Inside a fiber this also reports a pending kill request.
    pub fn check_stop(&self) -> Result<(), Stop> {
        let record = current::record();
        let phase = self.phase().max(record.as_ref().map_or(Phase::Running, |r| r.phase()));
        match pending_stop(record.as_deref(), phase) {
            Some(stop) => Err(stop),
            None => Ok(()),
        }
    }

    /// Like [`check_stop`](Self::check_stop), running `cleanup` before reporting a stop.
    /// A failing cleanup wins over the stop interrupt.
    pub fn check_stop_with<C>(&self, cleanup: C) -> Result<(), FiberError>
    where
        C: FnOnce() -> Result<(), FiberError>,
    {
        match self.check_stop() {
            Ok(()) => Ok(()),
            Err(stop) => {
                cleanup()?;
                Err(stop.into())
            }
        }
    }

    /// Awaits `fut` unless a stop applies first. Works from fibers and from
    /// the top-level context.
    pub async fn wait<F: Future>(&self, fut: F) -> Result<F::Output, Stop> {
        if !current::on_main_context() {
            return current::wait(fut).await;
        }
        self.check_stop()?;
        let mut phase = self.inner.phase.subscribe();
        tokio::select! {
            biased;
            Some(p) = stopping(&mut phase) => Err(p.as_stop().unwrap_or(Stop::Shutdown)),
            out = fut => Ok(out),
        }
    }

    /// Stop-aware sleep, usable from any context of this thread.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Stop> {
        self.wait(tokio::time::sleep(duration)).await
    }

    /// Yields to the scheduler with a check-point on both sides.
    pub async fn yield_now(&self) -> Result<(), Stop> {
        self.check_stop()?;
        tokio::task::yield_now().await;
        self.check_stop()
    }

    /// Registers `cleanup` to run once when the application starts stopping.
    ///
    /// Call it at the source end of a queue or promise that fibers wait on;
    /// `cleanup` must close it so waiters wake instead of hanging. Keep the
    /// returned handle alive as long as the resource.
    pub fn stop_listener<C>(&self, caller: &str, cleanup: C) -> StopListener
    where
        C: FnOnce() + 'static,
    {
        StopListener::spawn(
            &self.inner.local,
            self.inner.bus.clone(),
            caller.to_owned(),
            self.inner.phase.subscribe(),
            None,
            cleanup,
        )
    }

    /// Like [`stop_listener`](Self::stop_listener), but also fires when the
    /// `consumer` fiber is killed. An empty `consumer` means the calling fiber.
    ///
    /// If `consumer` is not a live fiber only the phase trigger remains.
    pub fn stop_listener_for<C>(&self, caller: &str, consumer: &str, cleanup: C) -> StopListener
    where
        C: FnOnce() + 'static,
    {
        let consumer = if consumer.is_empty() {
            current::name()
        } else {
            consumer.to_owned()
        };
        let target = match self.inner.registry.get(&consumer) {
            Some(record) => Some((consumer, record.kill_token())),
            None => {
                tracing::debug!(caller, consumer = %consumer, "stop listener consumer not live");
                None
            }
        };
        StopListener::spawn(
            &self.inner.local,
            self.inner.bus.clone(),
            caller.to_owned(),
            self.inner.phase.subscribe(),
            target,
            cleanup,
        )
    }

    /// Graceful teardown: `Stopping` → `Stopped`, wait up to the configured
    /// grace for fibers to unwind, then `Shutdown`.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] listing fibers still live when
    /// the grace period ran out. Call from the top-level context inside
    /// [`run_until`](Self::run_until).
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.shutdown_within(self.inner.cfg.grace).await
    }

    /// [`shutdown`](Self::shutdown) with an explicit grace period.
    pub async fn shutdown_within(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.advance_phase(Phase::Stopping);
        tokio::task::yield_now().await;
        self.advance_phase(Phase::Stopped);

        let drained = tokio::time::timeout(grace, self.wait_until_empty()).await;
        let res = match drained {
            Ok(()) => Ok(()),
            Err(_) => {
                let stuck = self.names();
                self.print_active_coroutines("grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        };
        self.advance_phase(Phase::Shutdown);

        let listener = self.inner.listener.borrow_mut().take();
        if let Some(listener) = listener {
            listener.close().await;
        }
        res
    }

    /// Waits for a termination signal, then runs [`shutdown`](Self::shutdown).
    pub async fn shutdown_on_signal(&self) -> Result<(), RuntimeError> {
        super::shutdown::wait_for_shutdown_signal().await?;
        tracing::info!("termination signal received");
        self.shutdown().await
    }

    async fn wait_until_empty(&self) {
        loop {
            let notified = self.inner.exits.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of subscribers still receiving events. Drops to zero once
    /// [`shutdown`](Self::shutdown) has flushed them.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .listener
            .borrow()
            .as_ref()
            .map_or(0, SubscriberListener::subscribers)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // fibers still pending are about to be dropped with the local set
        for name in self.registry.names() {
            tracing::debug!(fiber = %name, "dropping unfinished fiber");
            self.bus
                .publish(Event::new(EventKind::FiberDropped).with_fiber(name));
        }
    }
}

impl std::fmt::Debug for Coros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coros")
            .field("live", &self.names())
            .field("phase", &self.phase())
            .field("pending_failures", &self.pending_failures())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current::TempStatus;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::subscribers::Subscribe;

    fn coros() -> Coros {
        Coros::new(CorosConfig::default())
    }

    /// Lets the local set run everything that is ready.
    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    async fn park() -> Result<(), FiberError> {
        current::wait(std::future::pending::<()>()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn launched_fibers_get_distinct_names() {
        let c = coros();
        c.run_until(async {
            let names: Vec<String> = (0..3).map(|_| c.launch("job", park)).collect();
            assert_eq!(names, vec!["job1", "job2", "job3"]);
            assert_eq!(c.launch("fetch", park), "fetch4");

            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(names.iter().all(|n| c.is_live(n)));
            assert_eq!(c.len(), 4);
            assert_eq!(c.names(), vec!["fetch4", "job1", "job2", "job3"]);
        })
        .await;
    }

    #[tokio::test]
    async fn launch_runs_body_to_first_suspension() {
        let c = coros();
        c.run_until(async {
            let before = Rc::new(Cell::new(false));
            let after = Rc::new(Cell::new(false));
            let (b, a) = (before.clone(), after.clone());

            let name = c.launch("step", move || async move {
                b.set(true);
                current::yield_now().await?;
                a.set(true);
                Ok::<(), FiberError>(())
            });
            assert!(before.get());
            assert!(!after.get());
            assert!(c.is_live(&name));

            settle().await;
            assert!(after.get());
            assert!(!c.is_live(&name));
            assert!(c.is_empty());
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn immediate_failure_is_relayed_to_main() {
        let c = coros();
        c.run_until(async {
            let name = c.launch("fetch", || async {
                Err::<(), _>(FiberError::failed("network down"))
            });
            assert_eq!(name, "fetch1");
            assert!(!c.is_live(&name));
            assert_eq!(c.pending_failures(), 1);

            let err = c.rethrow().expect_err("failure pending");
            assert_eq!(err.fiber, "fetch1");
            assert!(err.to_string().contains("network down"));
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn failures_are_rethrown_in_arrival_order() {
        let c = coros();
        c.run_until(async {
            c.launch("a", || async { Err::<(), _>(FiberError::failed("first")) });
            c.launch("b", || async {
                current::yield_now().await?;
                if current::name() == "b2" {
                    panic!("second");
                }
                Ok::<(), FiberError>(())
            });
            c.launch("c", || async { Err::<(), _>(FiberError::failed("third")) });
            settle().await;

            let first = c.rethrow().expect_err("a failed");
            let second = c.rethrow().expect_err("c failed");
            let third = c.rethrow().expect_err("b panicked");
            assert_eq!(first.fiber, "a1");
            assert_eq!(second.fiber, "c3");
            assert_eq!(third.fiber, "b2");
            assert!(matches!(third.error, FiberError::Panicked { ref message } if message == "second"));
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn kill_request_raises_killed_at_next_check() {
        let c = coros();
        c.run_until(async {
            assert!(!c.request_kill("nope"));

            let seen: Rc<RefCell<Option<Stop>>> = Rc::new(RefCell::new(None));
            let s = seen.clone();
            let name = c.launch("worker", move || async move {
                loop {
                    if let Err(stop) = current::check_stop() {
                        *s.borrow_mut() = Some(stop.clone());
                        return Err::<(), _>(FiberError::from(stop));
                    }
                    tokio::task::yield_now().await;
                }
            });
            settle().await;
            assert!(c.is_live(&name));

            assert!(c.request_kill(&name));
            assert!(c.request_kill(&name));
            let info = c.snapshot();
            assert_eq!(info[0].killed_by.as_deref(), Some(current::log_name().as_str()));

            settle().await;
            assert!(!c.is_live(&name));
            assert_eq!(
                *seen.borrow(),
                Some(Stop::Killed {
                    by: current::log_name()
                })
            );
            // stop interrupts are intentional exits, never relayed
            assert!(c.rethrow().is_ok());
            assert!(!c.request_kill(&name));
        })
        .await;
    }

    #[tokio::test]
    async fn kill_wakes_stop_aware_wait() {
        let c = coros();
        c.run_until(async {
            let name = c.launch("sleeper", || async {
                current::sleep(Duration::from_secs(3600)).await?;
                Ok::<(), FiberError>(())
            });
            c.request_kill(&name);
            settle().await;
            assert!(!c.is_live(&name));
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn phase_outranks_kill_and_never_regresses() {
        let c = coros();
        c.run_until(async {
            let seen: Rc<RefCell<Option<Stop>>> = Rc::new(RefCell::new(None));
            let s = seen.clone();
            let name = c.launch("w", move || async move {
                let res = current::wait(std::future::pending::<()>()).await;
                if let Err(stop) = &res {
                    *s.borrow_mut() = Some(stop.clone());
                }
                res?;
                Ok::<(), FiberError>(())
            });
            c.request_kill(&name);
            assert!(c.advance_phase(Phase::Stopping));
            assert!(!c.advance_phase(Phase::Running));
            assert_eq!(c.phase(), Phase::Stopping);
            settle().await;
            assert_eq!(*seen.borrow(), Some(Stop::Stopping));
            assert_eq!(c.check_stop(), Err(Stop::Stopping));
        })
        .await;
    }

    #[tokio::test]
    async fn stop_listener_closes_bridged_queue_once() {
        let c = coros();
        c.run_until(async {
            let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
            let got = Rc::new(RefCell::new(Vec::new()));
            let seen: Rc<RefCell<Option<Stop>>> = Rc::new(RefCell::new(None));
            let (g, st) = (got.clone(), seen.clone());

            let name = c.launch("consumer", move || async move {
                // plain recv: only the listener cleanup can wake this
                while let Some(v) = rx.recv().await {
                    g.borrow_mut().push(v);
                }
                let res = current::check_stop();
                *st.borrow_mut() = res.clone().err();
                res?;
                Ok::<(), FiberError>(())
            });

            let sender = Rc::new(RefCell::new(Some(tx)));
            let calls = Rc::new(Cell::new(0));
            let (s, n) = (sender.clone(), calls.clone());
            let listener = c.stop_listener("queue", move || {
                n.set(n.get() + 1);
                s.borrow_mut().take();
            });
            assert!(listener.is_connected());

            if let Some(tx) = sender.borrow().as_ref() {
                tx.send(1).ok();
                tx.send(2).ok();
            }
            settle().await;
            assert_eq!(*got.borrow(), vec![1, 2]);

            c.advance_phase(Phase::Stopped);
            settle().await;
            c.advance_phase(Phase::Shutdown);
            settle().await;

            assert_eq!(calls.get(), 1);
            assert!(listener.has_fired());
            assert!(!listener.is_connected());
            assert_eq!(*seen.borrow(), Some(Stop::Stopped));
            assert!(!c.is_live(&name));
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn scoped_listener_fires_on_consumer_kill() {
        let c = coros();
        c.run_until(async {
            let name = c.launch("reader", park);
            let calls = Rc::new(Cell::new(0));
            let n = calls.clone();
            let listener = c.stop_listener_for("promise", &name, move || n.set(n.get() + 1));

            settle().await;
            assert_eq!(calls.get(), 0);

            c.request_kill(&name);
            settle().await;
            assert_eq!(calls.get(), 1);
            assert!(listener.has_fired());

            c.advance_phase(Phase::Stopping);
            settle().await;
            assert_eq!(calls.get(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn scoped_listener_for_unknown_consumer_waits_for_phase() {
        let c = coros();
        c.run_until(async {
            let calls = Rc::new(Cell::new(0));
            let n = calls.clone();
            let _listener = c.stop_listener_for("promise", "ghost9", move || n.set(n.get() + 1));
            settle().await;
            assert_eq!(calls.get(), 0);

            c.advance_phase(Phase::Stopping);
            settle().await;
            assert_eq!(calls.get(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn disconnected_listener_never_fires() {
        let c = coros();
        c.run_until(async {
            let calls = Rc::new(Cell::new(0));
            let (n1, n2) = (calls.clone(), calls.clone());

            let explicit = c.stop_listener("a", move || n1.set(n1.get() + 1));
            explicit.disconnect();
            drop(c.stop_listener("b", move || n2.set(n2.get() + 1)));

            c.advance_phase(Phase::Stopping);
            settle().await;
            assert_eq!(calls.get(), 0);
        })
        .await;
    }

    #[tokio::test]
    async fn status_guard_is_per_fiber() {
        let c = coros();
        c.run_until(async {
            current::set_status("main loop");
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();

            let name = c.launch("loader", move || async move {
                current::set_status("idle");
                {
                    let _s = TempStatus::new("loading");
                    let _ = current::wait(rx).await?;
                }
                assert_eq!(current::status(), "idle");
                current::yield_now().await?;
                Ok::<(), FiberError>(())
            });

            assert_eq!(c.snapshot()[0].status, "loading");
            assert_eq!(current::status(), "main loop");

            tx.send(()).ok();
            settle().await;
            assert!(!c.is_live(&name));
            assert!(c.rethrow().is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn fiber_context_queries() {
        let c = coros();
        c.set_stack_size(64 * 1024);
        c.run_until(async {
            assert!(c.on_main_thread_top_level());
            assert!(current::on_main_context());

            let inner = c.clone();
            let flags = Rc::new(RefCell::new(Vec::new()));
            let f = flags.clone();
            c.launch("probe", move || async move {
                f.borrow_mut().push(inner.on_main_thread_top_level());
                f.borrow_mut().push(current::on_main_context());
                f.borrow_mut().push(current::name() == "probe1");
                f.borrow_mut().push(current::log_name() == "probe1");
                inner.yield_now().await?;
                Ok::<(), FiberError>(())
            });
            assert_eq!(*flags.borrow(), vec![false, false, true, true]);
            assert_eq!(c.snapshot()[0].stack_size, 64 * 1024);
            settle().await;
        })
        .await;
    }

    #[tokio::test]
    async fn fibers_can_launch_fibers() {
        let c = coros();
        c.run_until(async {
            let inner = c.clone();
            let child = Rc::new(RefCell::new(String::new()));
            let ch = child.clone();
            c.launch("parent", move || async move {
                *ch.borrow_mut() = inner.launch("child", park);
                Ok::<(), FiberError>(())
            });
            assert_eq!(*child.borrow(), "child2");
            assert!(c.is_live("child2"));
            assert!(!c.is_live("parent1"));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unwinds_cooperative_fibers() {
        let c = coros();
        let res = c
            .run_until(async {
                c.launch("sleeper", || async {
                    current::sleep(Duration::from_secs(3600)).await?;
                    Ok::<(), FiberError>(())
                });
                c.launch("parked", park);
                c.shutdown_within(Duration::from_secs(1)).await
            })
            .await;
        assert!(res.is_ok());
        assert!(c.is_empty());
        assert_eq!(c.phase(), Phase::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_stuck_fibers() {
        let c = coros();
        let res = c
            .run_until(async {
                // never passes a check-point
                c.launch("stuck", || async {
                    std::future::pending::<()>().await;
                    Ok::<(), FiberError>(())
                });
                c.launch("fine", park);
                c.shutdown_within(Duration::from_millis(50)).await
            })
            .await;
        match res {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, vec!["stuck1"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.phase(), Phase::Shutdown);
    }

    #[tokio::test]
    async fn main_context_wait_sees_phase() {
        let c = coros();
        c.run_until(async {
            assert_eq!(c.wait(async { 3 }).await, Ok(3));
            c.advance_phase(Phase::Stopped);
            assert_eq!(c.wait(async { 3 }).await, Err(Stop::Stopped));
            // the free function has no fiber record on the main context
            assert!(current::check_stop().is_ok());
            let r = c.check_stop_with(|| Err(FiberError::failed("cleanup broke")));
            assert!(matches!(r, Err(FiberError::Failed(_))));
            let r = c.check_stop_with(|| Ok(()));
            assert!(matches!(r, Err(FiberError::Stop(Stop::Stopped))));
        })
        .await;
    }

    struct Recorder(Arc<Mutex<Vec<EventKind>>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            if let Ok(mut kinds) = self.0.lock() {
                kinds.push(ev.kind);
            }
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn builder_delivers_lifecycle_events() {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let c = Coros::builder(CorosConfig::default())
            .subscriber(Arc::new(Recorder(kinds.clone())))
            .build();
        assert_eq!(c.subscriber_count(), 1);

        c.run_until(async {
            c.launch("ok", || async { Ok::<(), FiberError>(()) });
            c.launch("bad", || async { Err::<(), _>(FiberError::failed("x")) });
            c.advance_phase(Phase::Stopping);
            for _ in 0..50 {
                if kinds.lock().map(|k| k.len() >= 5).unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        let kinds = kinds.lock().map(|k| k.clone()).unwrap_or_default();
        assert_eq!(
            kinds,
            vec![
                EventKind::FiberLaunched,
                EventKind::FiberFinished,
                EventKind::FiberLaunched,
                EventKind::FiberFailed,
                EventKind::PhaseChanged,
            ]
        );
    }

    #[tokio::test]
    async fn zero_stack_size_restores_default() {
        let c = coros();
        c.set_stack_size(64 * 1024);
        assert_eq!(c.stack_size(), 64 * 1024);
        c.set_stack_size(0);
        assert_eq!(c.stack_size(), CorosConfig::DEFAULT_STACK_SIZE);
        c.run_until(async {
            c.launch("w", park);
            assert_eq!(c.snapshot()[0].stack_size, CorosConfig::DEFAULT_STACK_SIZE);
        })
        .await;
    }

    #[tokio::test]
    async fn shutdown_flushes_subscribers() {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let c = Coros::builder(CorosConfig::default())
            .subscriber(Arc::new(Recorder(kinds.clone())))
            .build();

        let res = c
            .run_until(async {
                c.launch("parked", park);
                c.launch("ok", || async { Ok::<(), FiberError>(()) });
                c.shutdown().await
            })
            .await;
        assert!(res.is_ok());
        assert_eq!(c.subscriber_count(), 0);

        // no waiting: shutdown returned only after the subscriber saw everything
        let kinds = kinds.lock().map(|k| k.clone()).unwrap_or_default();
        let count = |kind: EventKind| kinds.iter().filter(|k| **k == kind).count();
        assert_eq!(kinds.len(), 7, "{kinds:?}");
        assert_eq!(count(EventKind::FiberLaunched), 2);
        assert_eq!(count(EventKind::FiberFinished), 1);
        assert_eq!(count(EventKind::FiberStopped), 1);
        assert_eq!(count(EventKind::PhaseChanged), 3);
        assert_eq!(kinds.last(), Some(&EventKind::PhaseChanged));
    }

    #[tokio::test]
    async fn dropping_registry_reports_pending_fibers_and_closes_bus() {
        let c = coros();
        let mut rx = c.bus().subscribe();
        c.run_until(async {
            c.launch("parked", park);
        })
        .await;
        drop(c);

        let mut seen = Vec::new();
        while let Ok(ev) = rx.recv().await {
            seen.push((ev.kind, ev.fiber.as_deref().map(str::to_owned)));
        }
        assert_eq!(
            seen,
            vec![
                (EventKind::FiberLaunched, Some("parked1".to_owned())),
                (EventKind::FiberDropped, Some("parked1".to_owned())),
            ]
        );
        assert!(matches!(
            rx.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn subscribers_see_drop_and_stop_with_the_registry() {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let c = Coros::builder(CorosConfig::default())
            .subscriber(Arc::new(Recorder(kinds.clone())))
            .build();
        c.run_until(async {
            c.launch("parked", park);
        })
        .await;
        drop(c);

        for _ in 0..50 {
            if kinds.lock().map(|k| k.len() >= 2).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let kinds = kinds.lock().map(|k| k.clone()).unwrap_or_default();
        assert_eq!(kinds, vec![EventKind::FiberLaunched, EventKind::FiberDropped]);
    }
}
