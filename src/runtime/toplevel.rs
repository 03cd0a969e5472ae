//! # Fiber wrapper: run one body and classify how it ended.
//!
//! ## Outcome handling
//! ```text
//! body() ─► Ok(())                 ─► publish FiberFinished
//!        ─► Err(FiberError::Stop)  ─► publish FiberStopped   (discarded)
//!        ─► Err(Failed)            ─► relay.capture + publish FiberFailed
//!        ─► panic                  ─► Panicked ─► relay.capture + FiberFailed
//!
//! always (ExitGuard drop) ─► registry.remove(name) ─► exits.notify_waiters()
//! ```
//!
//! A fiber still pending when the registry itself is dropped is reported as
//! `FiberDropped` by the registry, before its future is discarded.
//!
//! ## Rules
//! - The wrapper only holds a weak reference to the registry, so pending fibers
//!   never keep it alive.
//! - The record is removed exactly once, on every exit path.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::Weak;

use futures::FutureExt;

use super::coros::Inner;
use crate::error::FiberError;
use crate::events::{Event, EventKind};

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Removes the record when the fiber future finishes or is dropped.
struct ExitGuard {
    owner: Weak<Inner>,
    name: String,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let Some(inner) = self.owner.upgrade() else {
            return;
        };
        inner.registry.remove(&self.name);
        inner.exits.notify_waiters();
    }
}

/// Body of every registry fiber.
pub(crate) async fn toplevel<F, Fut>(owner: Weak<Inner>, name: String, body: F)
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<(), FiberError>> + 'static,
{
    let guard = ExitGuard { owner, name };

    let outcome = match AssertUnwindSafe(async move { body().await })
        .catch_unwind()
        .await
    {
        Ok(res) => res,
        Err(payload) => Err(FiberError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    };

    let Some(inner) = guard.owner.upgrade() else {
        return;
    };
    let name = guard.name.as_str();
    match outcome {
        Ok(()) => {
            tracing::debug!(fiber = name, "fiber finished");
            inner
                .bus
                .publish(Event::new(EventKind::FiberFinished).with_fiber(name));
        }
        Err(FiberError::Stop(stop)) => {
            tracing::debug!(fiber = name, stop = %stop, "fiber terminated by stop request");
            inner.bus.publish(
                Event::new(EventKind::FiberStopped)
                    .with_fiber(name)
                    .with_reason(stop.as_label()),
            );
        }
        Err(err) => {
            inner.bus.publish(
                Event::new(EventKind::FiberFailed)
                    .with_fiber(name)
                    .with_reason(err.to_string()),
            );
            inner.relay.capture(name, err);
        }
    }
}
