//! # Exception relay.
//!
//! Fibers are fire-and-forget: nothing awaits their result. Failures escaping
//! a fiber body are queued here and replayed, oldest first, on the thread's
//! top-level context by [`Coros::rethrow`](crate::Coros::rethrow).

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::{FiberError, RelayedError};

/// FIFO of fiber failures waiting for the main context.
#[derive(Default)]
pub(crate) struct ExceptionRelay {
    queue: RefCell<VecDeque<RelayedError>>,
}

impl ExceptionRelay {
    /// Queues a failure. Never fails.
    pub(crate) fn capture(&self, fiber: &str, error: FiberError) {
        tracing::warn!(fiber, error = %error, "fiber failed; queued for main context");
        self.queue.borrow_mut().push_back(RelayedError {
            fiber: fiber.to_owned(),
            error,
        });
    }

    /// Pops the oldest failure as `Err`, or `Ok(())` if none is pending.
    pub(crate) fn drain_one(&self) -> Result<(), RelayedError> {
        match self.queue.borrow_mut().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}
