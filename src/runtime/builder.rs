use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::coros::Coros;
use crate::config::CorosConfig;
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Coros`] registry with event subscribers attached.
pub struct CorosBuilder {
    cfg: CorosConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl CorosBuilder {
    pub fn new(cfg: CorosConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each one receives lifecycle events (launch, exit, kill, phase changes)
    /// through its own worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Appends a single subscriber.
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the registry.
    ///
    /// With subscribers present this spawns their workers plus a listener that
    /// forwards bus events to them, so it must run inside a tokio runtime.
    pub fn build(self) -> Coros {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        if self.subscribers.is_empty() {
            return Coros::from_parts(self.cfg, bus, None);
        }

        let set = SubscriberSet::new(self.subscribers, &bus);
        let listener = SubscriberListener::spawn(&bus, set);
        Coros::from_parts(self.cfg, bus, Some(listener))
    }
}

/// Task forwarding bus events to the subscriber set.
///
/// It ends when [`close`](Self::close) is called or when the bus closes (the
/// registry was dropped). Either way it first forwards everything already
/// published, then drains the subscriber queues.
pub(crate) struct SubscriberListener {
    stop: CancellationToken,
    handle: JoinHandle<()>,
    subscribers: usize,
}

impl SubscriberListener {
    pub(crate) fn spawn(bus: &Bus, set: SubscriberSet) -> Self {
        let stop = CancellationToken::new();
        let subscribers = set.len();
        let handle = tokio::spawn(forward(bus.subscribe(), set, stop.clone()));
        Self {
            stop,
            handle,
            subscribers,
        }
    }

    pub(crate) fn subscribers(&self) -> usize {
        self.subscribers
    }

    /// Forwards pending events, shuts the subscriber workers down and waits for them.
    pub(crate) async fn close(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "subscriber listener ended abnormally");
        }
    }
}

async fn forward(mut rx: broadcast::Receiver<Event>, set: SubscriberSet, stop: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            },
            _ = stop.cancelled() => {
                loop {
                    match rx.try_recv() {
                        Ok(ev) => set.emit(&ev),
                        Err(TryRecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                    }
                }
                break;
            }
        }
    }
    set.shutdown().await;
}
