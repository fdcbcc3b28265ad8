//! Error types used by the rine runtime, its routines and its call sites.
//!
//! This module defines three error enums:
//!
//! - [`UsageError`]: programming mistakes detected synchronously at the call site.
//! - [`RoutineError`]: failures delivered into (or returned from) a routine body.
//! - [`RuntimeError`]: failures surfaced by the runtime itself from [`Runtime::run`](crate::Runtime::run).
//!
//! Terminal channel states (`Closed`/`Ended`) are **not** errors: they arrive as
//! ordinary [`Signal`](crate::Signal) values and callers branch on them.
//!
//! All types provide helper methods (`as_label`, `as_message`) for logging.

use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;

/// # Usage errors.
///
/// Raised synchronously, never deferred: they indicate a programming mistake
/// rather than a condition worth retrying.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// A multi-channel operation was called with an empty channel list.
    #[error("operation requires at least one channel")]
    NoChannels,

    /// A channel owned by a different runtime was passed in.
    #[error("channel {channel:?} belongs to another runtime")]
    ForeignChannel {
        /// Name of the offending channel.
        channel: Arc<str>,
    },

    /// A channel was asked to tap into itself.
    #[error("channel {channel:?} cannot tap into itself")]
    SelfTap {
        /// Name of the channel.
        channel: Arc<str>,
    },

    /// The runtime owning the handle has been dropped.
    #[error("runtime is gone")]
    RuntimeGone,
}

impl UsageError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rine::UsageError;
    ///
    /// assert_eq!(UsageError::NoChannels.as_label(), "usage_no_channels");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            UsageError::NoChannels => "usage_no_channels",
            UsageError::ForeignChannel { .. } => "usage_foreign_channel",
            UsageError::SelfTap { .. } => "usage_self_tap",
            UsageError::RuntimeGone => "usage_runtime_gone",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            UsageError::NoChannels => "no channels".to_string(),
            UsageError::ForeignChannel { channel } => format!("foreign channel: {channel}"),
            UsageError::SelfTap { channel } => format!("self tap: {channel}"),
            UsageError::RuntimeGone => "runtime gone".to_string(),
        }
    }
}

/// # Errors seen by routines.
///
/// Returned into a routine at its current suspension point (a failed deferred
/// value, a stopped callee) so the body can recover locally, or returned from
/// the body itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutineError {
    /// The routine (or a deferred value it awaited) failed.
    #[error("routine failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The called routine was stopped before it produced a value.
    #[error("routine {routine:?} was stopped")]
    Stopped {
        /// Name of the stopped routine.
        routine: Arc<str>,
    },

    /// The routine asked for more restarts than `Config::restart_limit` allows.
    #[error("routine {routine:?} exceeded restart limit {limit}")]
    RestartLimit {
        /// Name of the routine.
        routine: Arc<str>,
        /// The configured limit.
        limit: u32,
    },

    /// A usage error raised while building an operation.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl RoutineError {
    /// Builds a [`RoutineError::Failed`] from any displayable error.
    pub fn failed(error: impl Display) -> Self {
        RoutineError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rine::RoutineError;
    ///
    /// let err = RoutineError::failed("boom");
    /// assert_eq!(err.as_label(), "routine_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RoutineError::Failed { .. } => "routine_failed",
            RoutineError::Stopped { .. } => "routine_stopped",
            RoutineError::RestartLimit { .. } => "routine_restart_limit",
            RoutineError::Usage(_) => "routine_usage",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RoutineError::Failed { error } => format!("error: {error}"),
            RoutineError::Stopped { routine } => format!("stopped: {routine}"),
            RoutineError::RestartLimit { routine, limit } => {
                format!("restart limit {limit} exceeded by {routine}")
            }
            RoutineError::Usage(e) => e.as_message(),
        }
    }
}

/// # Errors produced by the runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// A routine failed and nobody was set up to receive the error.
    #[error("unhandled failure in routine {routine:?}: {error}")]
    Unhandled {
        /// Name of the failing routine.
        routine: Arc<str>,
        /// The error it returned.
        #[source]
        error: RoutineError,
    },

    /// Subscribers were configured outside of a tokio runtime context.
    #[error("subscribers require a tokio runtime context")]
    NoReactor,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Unhandled { .. } => "runtime_unhandled",
            RuntimeError::NoReactor => "runtime_no_reactor",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Unhandled { routine, error } => {
                format!("unhandled in {routine}: {}", error.as_message())
            }
            RuntimeError::NoReactor => "no tokio reactor".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_converts_into_routine_error() {
        let err: RoutineError = UsageError::NoChannels.into();
        assert_eq!(err, RoutineError::Usage(UsageError::NoChannels));
        assert_eq!(err.as_label(), "routine_usage");
        assert_eq!(err.to_string(), "operation requires at least one channel");
    }

    #[test]
    fn test_unhandled_message_names_routine() {
        let err = RuntimeError::Unhandled {
            routine: "worker".into(),
            error: RoutineError::failed("boom"),
        };
        assert_eq!(err.as_label(), "runtime_unhandled");
        assert_eq!(err.as_message(), "unhandled in worker: error: boom");
    }
}
