//! Core error types.

use thiserror::Error;

/// Boxed error returned by user-supplied guards and actions.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the statechart engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid chart configuration: {reason}")]
    Config { reason: String },

    #[error("state could not be found: {path}")]
    StateNotFound { path: String },

    #[error("no relative path exists for: {target}")]
    NoRelativePath { target: String },

    #[error("no transition matches event '{event}' in state '{state}'")]
    NoMatchingTransition { event: String, state: String },

    #[error("guard is not satisfied for event '{event}' in state '{state}'")]
    GuardNotSatisfied { event: String, state: String },

    #[error("{count} transitions are allowed for event '{event}' in state '{state}'")]
    AmbiguousTransition {
        event: String,
        state: String,
        count: usize,
    },

    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("context does not provide method: {name}")]
    UnresolvedMethod { name: String },

    #[error("automatic transitions exceeded depth {limit} at state '{state}'")]
    AutoTransitionLimit { limit: usize, state: String },

    #[error("instance is not ready (phase: {phase})")]
    NotReady { phase: String },

    /// Failure raised inside a guard or action, passed through untouched.
    #[error(transparent)]
    Callback(CallbackError),
}

impl CoreError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        CoreError::Config {
            reason: reason.into(),
        }
    }

    /// Returns whether the caller can recover by retrying with other input.
    ///
    /// Configuration errors are fatal for the chart; every other error
    /// leaves a usable instance behind.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Config { .. })
    }

    /// Returns a stable error code for tooling output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Config { .. } => "CONFIG",
            CoreError::StateNotFound { .. } => "STATE_NOT_FOUND",
            CoreError::NoRelativePath { .. } => "NO_RELATIVE_PATH",
            CoreError::NoMatchingTransition { .. } => "NO_MATCHING_TRANSITION",
            CoreError::GuardNotSatisfied { .. } => "GUARD_NOT_SATISFIED",
            CoreError::AmbiguousTransition { .. } => "AMBIGUOUS_TRANSITION",
            CoreError::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            CoreError::UnresolvedMethod { .. } => "UNRESOLVED_METHOD",
            CoreError::AutoTransitionLimit { .. } => "AUTO_TRANSITION_LIMIT",
            CoreError::NotReady { .. } => "NOT_READY",
            CoreError::Callback(_) => "CALLBACK",
        }
    }
}
