//! Message types exchanged with the camera sweep action server.
//!
//! A sweep goal goes through three kinds of messages:
//! - the goal itself (`GoalRequest`), sent once
//! - interim progress (`FeedbackSample`), zero or more times
//! - a terminal notification (`GoalTermination`), exactly once

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Default sweep angle in degrees
pub const DEFAULT_SWEEP_ANGLE: f64 = 30.0;

/// Default number of images to capture
pub const DEFAULT_IMAGE_COUNT: u32 = 10;

/// The goal sent to the camera sweep server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalRequest {
    /// Total angle to sweep, in degrees
    pub sweep_angle: f64,
    /// Number of images to capture across the sweep
    pub image_count: u32,
}

impl GoalRequest {
    pub fn new(sweep_angle: f64, image_count: u32) -> Self {
        Self {
            sweep_angle,
            image_count,
        }
    }
}

impl Default for GoalRequest {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_ANGLE, DEFAULT_IMAGE_COUNT)
    }
}

/// Progress reported by the server while a sweep is running
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackSample {
    /// Current angular position of the camera, in degrees
    pub current_angle: f64,
    /// Images captured so far
    pub current_image: u32,
}

/// Payload of a successfully completed sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalResult {
    /// Where the captured images were written
    pub image_path: String,
}

/// Unique identifier the server assigns to an accepted goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GoalId(Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The server's decision on a submitted goal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalResponse {
    Accepted {
        goal_id: GoalId,
        stamp: DateTime<Utc>,
    },
    Rejected,
}

impl GoalResponse {
    /// Accept a goal now, under a fresh id
    pub fn accepted() -> Self {
        GoalResponse::Accepted {
            goal_id: GoalId::new(),
            stamp: Utc::now(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, GoalResponse::Accepted { .. })
    }
}

/// How an accepted goal ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalTermination {
    Succeeded(GoalResult),
    Canceled,
    Aborted { reason: Option<String> },
}

/// The server's answer to a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelResponse {
    pub accepted: bool,
}

/// Final outcome of one goal lifecycle, as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalOutcome {
    Rejected,
    Succeeded(GoalResult),
    Cancelled,
    Aborted { reason: Option<String> },
}
