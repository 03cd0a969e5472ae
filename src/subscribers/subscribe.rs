//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for observing registry events. Each
//! subscriber is driven by a dedicated worker fed by a bounded queue owned by
//! the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they do **not** block fibers or other subscribers.
//! - If a subscriber's queue overflows, events for that subscriber are dropped
//!   and a `SubscriberOverflow` event is published.

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use coros::{Event, EventKind, Subscribe};
///
/// struct Failures;
///
/// #[async_trait]
/// impl Subscribe for Failures {
///     async fn on_event(&self, ev: &Event) {
///         if ev.kind == EventKind::FiberFailed {
///             // page someone
///         }
///     }
///     fn name(&self) -> &'static str { "failures" }
/// }
/// ```
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
