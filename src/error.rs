//! Error types used by the fiber registry and by fiber bodies.
//!
//! This module defines:
//!
//! - [`Stop`] cooperative interrupts raised by stop checks.
//! - [`FiberError`] the outcome of a fiber body that did not finish normally.
//! - [`RelayedError`] a captured fiber failure replayed on the main context.
//! - [`RuntimeError`] errors raised by the registry's shutdown sequence.
//!
//! All of them provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// Boxed opaque error carried by [`FiberError::Failed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Cooperative stop interrupts.
///
/// Ordered by severity: `Killed < Stopping < Stopped < Shutdown`. A later phase
/// implies the earlier ones, so catching code can compare with `>=`:
///
/// ```
/// use coros::Stop;
///
/// let s = Stop::Stopped;
/// assert!(s >= Stop::Stopping);
/// assert!(Stop::Killed { by: "main0".into() } < Stop::Stopping);
/// ```
///
/// None of these is a crash: a fiber that sees one should unwind and exit quietly.
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stop {
    /// Someone asked for this specific fiber to terminate.
    #[error("killed by {by}")]
    Killed {
        /// Log name of the requester.
        by: String,
    },

    /// Early shutdown stage.
    #[error("application stopping")]
    Stopping,

    /// Cleaning up.
    #[error("application stopped")]
    Stopped,

    /// Cleaned up; not much survives.
    #[error("application shut down")]
    Shutdown,
}

impl Stop {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Stop::Killed { .. } => "stop_killed",
            Stop::Stopping => "stop_stopping",
            Stop::Stopped => "stop_stopped",
            Stop::Shutdown => "stop_shutdown",
        }
    }

    /// True for the global teardown phases (everything except `Killed`).
    pub fn is_global(&self) -> bool {
        !matches!(self, Stop::Killed { .. })
    }
}

/// # Outcome of a fiber body that did not complete normally.
///
/// `Stop` is an intentional termination and is discarded by the registry;
/// `Failed` and `Panicked` are captured and relayed to the main context.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FiberError {
    /// The body unwound because of a cooperative stop.
    #[error(transparent)]
    Stop(#[from] Stop),

    /// The body returned an error.
    #[error("execution failed: {0}")]
    Failed(BoxError),

    /// The body panicked.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl FiberError {
    /// Wraps any error (or message) as [`FiberError::Failed`].
    ///
    /// # Example
    /// ```
    /// use coros::FiberError;
    ///
    /// let err = FiberError::failed("boom");
    /// assert_eq!(err.to_string(), "execution failed: boom");
    /// ```
    pub fn failed(error: impl Into<BoxError>) -> Self {
        FiberError::Failed(error.into())
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FiberError::Stop(stop) => stop.as_label(),
            FiberError::Failed(_) => "fiber_failed",
            FiberError::Panicked { .. } => "fiber_panicked",
        }
    }

    /// True if this is a cooperative stop rather than a real failure.
    pub fn is_stop(&self) -> bool {
        matches!(self, FiberError::Stop(_))
    }

    /// Returns the stop interrupt, if this is one.
    pub fn as_stop(&self) -> Option<&Stop> {
        match self {
            FiberError::Stop(stop) => Some(stop),
            _ => None,
        }
    }
}

impl From<BoxError> for FiberError {
    fn from(error: BoxError) -> Self {
        FiberError::Failed(error)
    }
}

/// A fiber failure captured by the exception relay and replayed by
/// [`Coros::rethrow`](crate::Coros::rethrow).
#[derive(Error, Debug)]
#[error("fiber '{fiber}' {error}")]
pub struct RelayedError {
    /// Name of the fiber the failure escaped from.
    pub fiber: String,
    /// The failure itself.
    #[source]
    pub error: FiberError,
}

impl RelayedError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        self.error.as_label()
    }
}

/// # Errors produced by the registry's shutdown sequence.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Grace period elapsed while some fibers were still live.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of fibers that did not exit in time.
        stuck: Vec<String>,
    },

    /// OS signal listeners could not be installed.
    #[error("signal registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use coros::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}
