//! The structured error kinds world-mutating operations report, per the error handling design:
//! callers at a system boundary (network thread, console command, `main`) convert these into
//! `anyhow` context; library code never panics on validated-at-the-boundary input.

use thiserror::Error;

/// A structured error raised by a world-mutation operation.
#[derive(Debug, Error)]
pub enum GameError {
    /// A caller-supplied argument was out of range or otherwise malformed (e.g. a voxel position
    /// outside `MAX_BLOCK_POS`, or an island id that was never issued).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An operation's precondition did not hold (e.g. setting a voxel on an island the caller
    /// does not have a loaded chunk for, attempting to split a still-connected island).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
    /// A client-originated message referenced a revision the server has already superseded; the
    /// recovery action is to drop the message, not to treat it as an error surfaced to the user.
    #[error("stale revision: {0}")]
    TransportStale(String),
    /// An invariant the engine itself is responsible for maintaining did not hold; indicates a
    /// bug rather than bad input, and is logged at error level by the caller.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl GameError {
    /// Shorthand for [`GameError::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`GameError::PreconditionViolation`].
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionViolation(msg.into())
    }

    /// Shorthand for [`GameError::TransportStale`].
    pub fn stale(msg: impl Into<String>) -> Self {
        Self::TransportStale(msg.into())
    }

    /// Shorthand for [`GameError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the recovery action for this error is to silently drop the triggering message
    /// rather than log it as a failure (stale client messages are expected under packet loss and
    /// reordering, not a sign anything went wrong).
    pub fn is_recoverable_by_drop(&self) -> bool {
        matches!(self, Self::TransportStale(_))
    }
}
