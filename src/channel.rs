use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::goal::{
    CancelResponse, FeedbackSample, GoalId, GoalRequest, GoalResponse, GoalTermination,
};

/// Where a channel pushes feedback for the goal it was given
pub type FeedbackSink = mpsc::UnboundedSender<FeedbackSample>;

/// Trait for action endpoints (a real transport or a simulated server).
///
/// Implementations must deliver notifications for a goal in order: the
/// goal response first, then any feedback, then exactly one termination.
#[async_trait]
pub trait ActionChannel: Send + Sync {
    /// Name of the action endpoint
    fn action_name(&self) -> &str;

    /// Whether the server is ready to take goals right now
    fn is_server_ready(&self) -> bool;

    /// Wait, without bound, until the server is ready
    async fn wait_for_server(&self);

    /// Send a goal; feedback for it is pushed into `feedback` once accepted
    async fn send_goal(&self, goal: GoalRequest, feedback: FeedbackSink) -> Result<GoalResponse>;

    /// Wait for the termination of an accepted goal
    async fn get_result(&self, goal_id: GoalId) -> Result<GoalTermination>;

    /// Ask the server to cancel an accepted goal
    async fn cancel_goal(&self, goal_id: GoalId) -> Result<CancelResponse>;
}

/// Proof that a goal was accepted; the only way to ask for its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalHandle {
    goal_id: GoalId,
    accepted_at: DateTime<Utc>,
}

impl GoalHandle {
    /// Returns a handle only for accepted responses
    pub(crate) fn from_response(response: GoalResponse) -> Option<Self> {
        match response {
            GoalResponse::Accepted { goal_id, stamp } => Some(Self {
                goal_id,
                accepted_at: stamp,
            }),
            GoalResponse::Rejected => None,
        }
    }

    pub fn goal_id(&self) -> GoalId {
        self.goal_id
    }

    pub fn accepted_at(&self) -> DateTime<Utc> {
        self.accepted_at
    }
}
