//! Runtime core: the registry handle, fiber wrapper and stop coordination.
//!
//! - `coros` the [`Coros`] handle and its operations
//! - `builder` attaches subscribers
//! - `registry` name table and generator
//! - `record` per-fiber control data
//! - `toplevel` wraps each fiber body and classifies its exit
//! - `primed` runs a new fiber up to its first suspension
//! - `relay` FIFO of failures awaiting the main context
//! - `phase` application teardown phase
//! - `stop` check-points and stop listeners
//! - `shutdown` termination signals

mod builder;
mod coros;
mod phase;
mod primed;
mod record;
mod registry;
mod relay;
mod shutdown;
mod stop;
mod toplevel;

pub use builder::CorosBuilder;
pub use coros::Coros;
pub use phase::Phase;
pub use record::FiberInfo;
pub use stop::StopListener;

pub(crate) use record::FiberRecord;
pub(crate) use stop::{next_stop, pending_stop};
pub(crate) use toplevel::panic_message;
