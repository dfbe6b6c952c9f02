use std::time::Duration;

use thiserror::Error;

use crate::state::{GoalState, Notification};

/// Errors that can occur while driving a camera sweep goal
#[derive(Error, Debug)]
pub enum SweepError {
    /// A notification arrived in a state that does not permit it
    #[error("protocol violation: {notification} received while goal is {state}")]
    ProtocolViolation {
        notification: Notification,
        state: GoalState,
    },

    /// The action server did not become reachable within the configured wait
    #[error("action server '{action}' unavailable after {waited:?}")]
    ServerUnavailable { action: String, waited: Duration },

    /// A controller only ever handles one goal
    #[error("a goal was already submitted on this client (state: {0})")]
    GoalAlreadySubmitted(GoalState),

    /// Cancellation is only possible while the goal is accepted
    #[error("cannot cancel goal while it is {0}")]
    CancelNotAllowed(GoalState),

    /// The action channel hung up before delivering a notification
    #[error("action channel closed: {0}")]
    ChannelClosed(String),

    /// Any other failure reported by the action channel
    #[error("transport error: {0}")]
    Transport(String),

    /// Error reading or parsing configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The goal parameters are unusable
    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    /// Shutdown was requested (e.g., via Ctrl+C) before the goal finished
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Result type alias for camera sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;
