//! # Event bus for broadcasting registry events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The registry,
//! the fiber wrapper and stop listeners publish; the subscriber listener and
//! any external collaborator subscribe.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.
//! - **Closes with its owner**: once every [`Bus`] clone is gone, receivers drain
//!   what is buffered and then see `Closed`. [`WeakBus`] publishers never keep
//!   the channel open.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for registry events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publisher handle that does not keep the channel open.
    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning publisher for a [`Bus`].
///
/// Used by long-lived helpers (subscriber workers) that report into the bus
/// but must not outlive the registry that owns it.
#[derive(Clone)]
pub struct WeakBus {
    tx: broadcast::WeakSender<Event>,
}

impl WeakBus {
    /// Publishes if the bus is still open; drops the event otherwise.
    pub fn publish(&self, ev: Event) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(ev);
        }
    }
}

impl std::fmt::Debug for WeakBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakBus")
            .field("open", &(self.tx.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::FiberLaunched));

        let mut rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        bus.publish(Event::new(EventKind::FiberFinished).with_fiber("job1"));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::FiberFinished);
        assert_eq!(ev.fiber.as_deref(), Some("job1"));
    }

    #[tokio::test]
    async fn weak_publisher_does_not_keep_bus_open() {
        let bus = Bus::new(4);
        let weak = bus.downgrade();
        let mut rx = bus.subscribe();

        weak.publish(Event::new(EventKind::PhaseChanged));
        drop(bus);
        weak.publish(Event::new(EventKind::FiberLaunched));

        let ev = rx.recv().await.expect("buffered event");
        assert_eq!(ev.kind, EventKind::PhaseChanged);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
