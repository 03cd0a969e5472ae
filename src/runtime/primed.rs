//! # Run a fiber to its first suspension on the launcher's stack.
//!
//! `launch` must return only after the new fiber has run up to its first
//! wait. The fiber future is therefore polled once directly, before it is
//! handed to the `LocalSet`.
//!
//! ## Waker relay
//! ```text
//! first poll (in launch) ──► inner futures register relay waker
//!                                       │
//! spawned task poll ──► relay.register(task waker) ──► inner.poll(relay waker)
//!                                       │
//! resource ready ──► relay.wake() ──► task waker ──► LocalSet polls again
//! ```
//! Inner futures only ever see the relay waker, so a registration made during
//! the first poll stays valid after the hand-off. A wake that lands before the
//! task's first poll is harmless: a freshly spawned task is always polled once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures::future::LocalBoxFuture;
use futures::task::{waker, ArcWake, AtomicWaker};

struct WakeRelay {
    target: AtomicWaker,
}

impl ArcWake for WakeRelay {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.target.wake();
    }
}

/// A fiber future plus the stable waker its inner futures register with.
pub(crate) struct Primed {
    fut: LocalBoxFuture<'static, ()>,
    relay: Arc<WakeRelay>,
    waker: Waker,
}

impl Primed {
    pub(crate) fn new(fut: LocalBoxFuture<'static, ()>) -> Self {
        let relay = Arc::new(WakeRelay {
            target: AtomicWaker::new(),
        });
        let waker = waker(relay.clone());
        Self { fut, relay, waker }
    }

    /// Polls once on the caller's stack. Returns the fiber if it is still pending.
    pub(crate) fn prime(mut self) -> Option<Self> {
        let mut cx = Context::from_waker(&self.waker);
        match self.fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => None,
            Poll::Pending => Some(self),
        }
    }
}

impl Future for Primed {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        this.relay.target.register(cx.waker());
        let mut inner = Context::from_waker(&this.waker);
        this.fut.as_mut().poll(&mut inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn ready_future_completes_during_prime() {
        let hit = Rc::new(Cell::new(false));
        let h = hit.clone();
        let primed = Primed::new(Box::pin(async move { h.set(true) }));
        assert!(primed.prime().is_none());
        assert!(hit.get());
    }

    #[tokio::test]
    async fn pending_future_resumes_through_relay() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let got = Rc::new(Cell::new(0));
        let g = got.clone();
        let before = Rc::new(Cell::new(false));
        let b = before.clone();

        let primed = Primed::new(Box::pin(async move {
            b.set(true);
            g.set(rx.await.unwrap_or(0));
        }))
        .prime()
        .expect("waits on the channel");
        assert!(before.get());

        let local = tokio::task::LocalSet::new();
        let handle = local.spawn_local(primed);
        tx.send(7).unwrap();
        local.run_until(handle).await.unwrap();
        assert_eq!(got.get(), 7);
    }
}
