//! # coros
//!
//! **Coros** is a per-thread registry of named cooperative fibers for Rust.
//!
//! A fiber is a `'static` future launched under a short, unique name. The
//! registry tracks each one's diagnostic status, relays its failures to the
//! thread's main loop, and coordinates teardown: kill requests, application
//! phases and stop listeners that wake fibers blocked on queues or promises.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   main loop (top-level context)
//!     │ launch("fetch", body)         request_kill("fetch1")     rethrow()
//!     ▼                                     │                       ▲
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Coros (one per thread, Rc-shared handle)                         │
//! │  - Registry        name → FiberRecord (status, kill, consuming)   │
//! │  - ExceptionRelay  FIFO of failures for the main loop             │
//! │  - PhaseCell       Running → Stopping → Stopped → Shutdown        │
//! │  - LocalSet        schedules fibers on this thread                │
//! │  - Bus             broadcast lifecycle events                     │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────┐       ┌──────────┐       ┌────────────────┐
//!     │ fetch1   │       │ job2     │       │ StopListener   │
//!     │ toplevel │       │ toplevel │       │ (cleanup once) │
//!     └──────────┘       └──────────┘       └────────────────┘
//!        │ publish FiberLaunched / FiberFinished / FiberFailed / ...
//!        ▼
//!   Bus ──► subscriber_listener ──► SubscriberSet ──► sub.on_event()
//! ```
//!
//! ### Fiber lifecycle
//! ```text
//! launch(prefix, body)
//!   ├─► name = prefix + counter       (unique among live fibers)
//!   ├─► registry.insert(record)
//!   ├─► body runs until its first suspension (still inside launch)
//!   └─► rest scheduled on the LocalSet
//!
//! body returns
//!   ├─ Ok(())                 ─► FiberFinished
//!   ├─ Err(FiberError::Stop)  ─► FiberStopped     (intentional, discarded)
//!   ├─ Err(other) / panic     ─► FiberFailed ─► relay ─► rethrow()
//!   └─ always                 ─► registry.remove(name)
//! ```
//!
//! ## Features
//! | Area             | Description                                                   | Key types / functions                        |
//! |------------------|---------------------------------------------------------------|----------------------------------------------|
//! | **Registry**     | Launch named fibers, inspect and kill them.                   | [`Coros`], [`FiberInfo`]                     |
//! | **Current fiber**| Name, status and consuming flag of the running context.       | [`current`]                                  |
//! | **Cancellation** | Cooperative check-points, phases and stop listeners.          | [`Stop`], [`Phase`], [`StopListener`]        |
//! | **Errors**       | Typed fiber failures, relayed failures and runtime errors.    | [`FiberError`], [`RelayedError`], [`RuntimeError`] |
//! | **Events**       | Lifecycle events with pluggable subscribers.                  | [`Event`], [`Subscribe`], [`CorosBuilder`]   |
//! | **Configuration**| Stack size, bus capacity, shutdown grace.                     | [`CorosConfig`]                              |
//!
//! ## Optional features
//! - `logging` (default): exports the [`LogWriter`] subscriber that logs events via `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use coros::{current, Coros, CorosConfig, FiberError};
//!
//! async fn tick() -> Result<(), FiberError> {
//!     loop {
//!         current::set_status("sleeping");
//!         current::sleep(Duration::from_millis(5)).await?;
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coros = Coros::new(CorosConfig::default());
//!     let c = coros.clone();
//!
//!     coros
//!         .run_until(async move {
//!             let name = c.launch("ticker", tick);
//!
//!             tokio::time::sleep(Duration::from_millis(20)).await;
//!             assert!(c.request_kill(&name));
//!
//!             while c.is_live(&name) {
//!                 tokio::task::yield_now().await;
//!             }
//!             c.rethrow()?;
//!             c.shutdown().await?;
//!             Ok::<(), Box<dyn std::error::Error>>(())
//!         })
//!         .await
//! }
//! ```
mod config;
pub mod current;
mod error;
mod events;
mod runtime;
mod subscribers;

// ---- Public re-exports ----

pub use config::CorosConfig;
pub use error::{BoxError, FiberError, RelayedError, RuntimeError, Stop};
pub use events::{Bus, Event, EventKind, WeakBus};
pub use runtime::{Coros, CorosBuilder, FiberInfo, Phase, StopListener};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: built-in tracing subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
