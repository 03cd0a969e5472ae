//! Registry events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`, [`WeakBus`] its non-owning publisher
//!
//! ## Quick reference
//! - **Publishers**: `Coros` (launch, kill, phase), the fiber wrapper (exit
//!   outcome), stop listeners, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener spawned by `CorosBuilder::build`
//!   and any collaborator holding a `Bus::subscribe()` receiver.

mod bus;
mod event;

pub use bus::{Bus, WeakBus};
pub use event::{Event, EventKind};
