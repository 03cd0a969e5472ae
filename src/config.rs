//! # Registry configuration.
//!
//! Provides [`CorosConfig`], the centralized settings for a fiber registry.
//!
//! ## Sentinel values
//! - `stack_size = 0` → use [`CorosConfig::DEFAULT_STACK_SIZE`]
//! - `grace = 0s` → shutdown does not wait for fibers at all

use std::time::Duration;

/// Configuration for a [`Coros`](crate::Coros) registry.
///
/// ## Field semantics
/// - `stack_size`: stack size recorded for fibers launched from now on
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `grace`: how long [`Coros::shutdown`](crate::Coros::shutdown) waits for fibers
/// - `verbose_kill_logging`: log duplicate and unknown-name kill requests
#[derive(Clone, Debug)]
pub struct CorosConfig {
    /// Stack size in bytes for newly launched fibers.
    ///
    /// Changing it (via [`Coros::set_stack_size`](crate::Coros::set_stack_size))
    /// never affects fibers that are already running.
    pub stack_size: usize,

    /// Capacity of the lifecycle event bus.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` events observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Maximum time to wait for live fibers to unwind during shutdown.
    pub grace: Duration,

    /// Emit debug lines for kill requests that find nothing to do
    /// (unknown fiber, already killed). Off by default.
    pub verbose_kill_logging: bool,
}

impl CorosConfig {
    /// Stack size used when none is configured.
    pub const DEFAULT_STACK_SIZE: usize = 512 * 1024;

    /// Returns the stack size, substituting the default for `0`.
    #[inline]
    pub fn stack_size_or_default(&self) -> usize {
        Self::effective_stack_size(self.stack_size)
    }

    /// Maps the `0` sentinel to [`DEFAULT_STACK_SIZE`](Self::DEFAULT_STACK_SIZE).
    #[inline]
    pub(crate) fn effective_stack_size(bytes: usize) -> usize {
        if bytes == 0 {
            Self::DEFAULT_STACK_SIZE
        } else {
            bytes
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for CorosConfig {
    /// Default configuration:
    ///
    /// - `stack_size = 512 KiB`
    /// - `bus_capacity = 1024`
    /// - `grace = 10s`
    /// - `verbose_kill_logging = false`
    fn default() -> Self {
        Self {
            stack_size: Self::DEFAULT_STACK_SIZE,
            bus_capacity: 1024,
            grace: Duration::from_secs(10),
            verbose_kill_logging: false,
        }
    }
}
