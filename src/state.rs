use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, SweepError};

/// Lifecycle state of the single goal a client handles.
///
/// ```text
/// Idle -> Submitted -> Rejected
///                   -> Accepted -> Succeeded | Cancelled | Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    Idle,
    Submitted,
    Rejected,
    Accepted,
    Succeeded,
    Cancelled,
    Aborted,
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalState::Idle => write!(f, "idle"),
            GoalState::Submitted => write!(f, "submitted"),
            GoalState::Rejected => write!(f, "rejected"),
            GoalState::Accepted => write!(f, "accepted"),
            GoalState::Succeeded => write!(f, "succeeded"),
            GoalState::Cancelled => write!(f, "cancelled"),
            GoalState::Aborted => write!(f, "aborted"),
        }
    }
}

impl GoalState {
    /// Check whether moving from this state to `next` is a legal step
    pub fn can_transition_to(&self, next: GoalState) -> bool {
        matches!(
            (self, next),
            (GoalState::Idle, GoalState::Submitted)
                | (GoalState::Submitted, GoalState::Rejected)
                | (GoalState::Submitted, GoalState::Accepted)
                | (GoalState::Accepted, GoalState::Succeeded)
                | (GoalState::Accepted, GoalState::Cancelled)
                | (GoalState::Accepted, GoalState::Aborted)
        )
    }

    /// No notification may follow a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GoalState::Rejected | GoalState::Succeeded | GoalState::Cancelled | GoalState::Aborted
        )
    }

    /// Feedback is only meaningful between acceptance and the result
    pub fn accepts_feedback(&self) -> bool {
        *self == GoalState::Accepted
    }
}

/// The kinds of notification an action channel delivers for a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    GoalResponse,
    Feedback,
    Result,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::GoalResponse => write!(f, "goal response"),
            Notification::Feedback => write!(f, "feedback"),
            Notification::Result => write!(f, "result"),
        }
    }
}

/// Point-in-time copy of the client status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: GoalState,
    pub goal_succeeded: bool,
    pub goal_cancelled: bool,
    pub stop: bool,
}

/// Status shared between the goal controller and the process host.
///
/// Only the controller writes; the host reads the flags between loop iterations.
#[derive(Debug)]
pub struct SharedState {
    goal_state: RwLock<GoalState>,
    goal_succeeded: RwLock<bool>,
    goal_cancelled: RwLock<bool>,
    stop: RwLock<bool>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create a new SharedState for a goal that has not been submitted yet
    pub fn new() -> Self {
        Self {
            goal_state: RwLock::new(GoalState::Idle),
            goal_succeeded: RwLock::new(false),
            goal_cancelled: RwLock::new(false),
            stop: RwLock::new(false),
        }
    }

    /// Create an Arc-wrapped SharedState for sharing between tasks
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get the current lifecycle state
    pub async fn goal_state(&self) -> GoalState {
        *self.goal_state.read().await
    }

    /// Move out of `Idle`; fails if this client already submitted a goal
    pub async fn begin_submission(&self) -> Result<()> {
        let mut state = self.goal_state.write().await;
        if *state != GoalState::Idle {
            return Err(SweepError::GoalAlreadySubmitted(*state));
        }
        *state = GoalState::Submitted;
        Ok(())
    }

    /// Apply the transition caused by `notification`, rejecting illegal ones
    pub async fn transition(&self, notification: Notification, next: GoalState) -> Result<()> {
        let mut state = self.goal_state.write().await;
        if !state.can_transition_to(next) {
            return Err(SweepError::ProtocolViolation {
                notification,
                state: *state,
            });
        }
        *state = next;
        Ok(())
    }

    /// Fail with a protocol violation unless feedback is currently allowed
    pub async fn check_feedback_allowed(&self) -> Result<()> {
        let state = *self.goal_state.read().await;
        if state.accepts_feedback() {
            Ok(())
        } else {
            Err(SweepError::ProtocolViolation {
                notification: Notification::Feedback,
                state,
            })
        }
    }

    pub async fn is_goal_succeeded(&self) -> bool {
        *self.goal_succeeded.read().await
    }

    pub async fn set_goal_succeeded(&self) {
        *self.goal_succeeded.write().await = true;
    }

    pub async fn is_goal_cancelled(&self) -> bool {
        *self.goal_cancelled.read().await
    }

    pub async fn set_goal_cancelled(&self) {
        *self.goal_cancelled.write().await = true;
    }

    /// Ask the host to stop driving the event loop
    pub async fn signal_stop(&self) {
        *self.stop.write().await = true;
    }

    pub async fn is_stopped(&self) -> bool {
        *self.stop.read().await
    }

    /// Snapshot all flags at once
    pub async fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.goal_state().await,
            goal_succeeded: self.is_goal_succeeded().await,
            goal_cancelled: self.is_goal_cancelled().await,
            stop: self.is_stopped().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [GoalState; 7] = [
        GoalState::Idle,
        GoalState::Submitted,
        GoalState::Rejected,
        GoalState::Accepted,
        GoalState::Succeeded,
        GoalState::Cancelled,
        GoalState::Aborted,
    ];

    #[test]
    fn test_terminal_states_have_no_successors() {
        for from in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for to in ALL_STATES {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_result_states_only_reachable_from_accepted() {
        for to in [GoalState::Succeeded, GoalState::Cancelled, GoalState::Aborted] {
            for from in ALL_STATES {
                assert_eq!(from.can_transition_to(to), from == GoalState::Accepted);
            }
        }
    }

    #[test]
    fn test_only_accepted_allows_feedback() {
        for state in ALL_STATES {
            assert_eq!(state.accepts_feedback(), state == GoalState::Accepted);
        }
    }

    #[tokio::test]
    async fn test_second_submission_is_refused() {
        let state = SharedState::new();
        state.begin_submission().await.unwrap();

        let err = state.begin_submission().await.unwrap_err();
        assert!(matches!(
            err,
            SweepError::GoalAlreadySubmitted(GoalState::Submitted)
        ));
    }

    #[tokio::test]
    async fn test_illegal_transition_reports_notification_and_state() {
        let state = SharedState::new();
        let err = state
            .transition(Notification::Result, GoalState::Succeeded)
            .await
            .unwrap_err();

        match err {
            SweepError::ProtocolViolation {
                notification,
                state,
            } => {
                assert_eq!(notification, Notification::Result);
                assert_eq!(state, GoalState::Idle);
            }
            other => panic!("Expected ProtocolViolation, got {:?}", other),
        }
        assert_eq!(state.goal_state().await, GoalState::Idle);
    }

    #[tokio::test]
    async fn test_feedback_check_follows_state() {
        let state = SharedState::new();
        assert!(state.check_feedback_allowed().await.is_err());

        state.begin_submission().await.unwrap();
        assert!(state.check_feedback_allowed().await.is_err());

        state
            .transition(Notification::GoalResponse, GoalState::Accepted)
            .await
            .unwrap();
        assert!(state.check_feedback_allowed().await.is_ok());

        state
            .transition(Notification::Result, GoalState::Succeeded)
            .await
            .unwrap();
        assert!(state.check_feedback_allowed().await.is_err());
    }

    #[tokio::test]
    async fn test_flags_start_cleared_and_stay_set() {
        let state = SharedState::new();
        let status = state.status().await;
        assert_eq!(
            status,
            ClientStatus {
                state: GoalState::Idle,
                goal_succeeded: false,
                goal_cancelled: false,
                stop: false,
            }
        );

        state.set_goal_succeeded().await;
        state.signal_stop().await;
        state.signal_stop().await;

        assert!(state.is_goal_succeeded().await);
        assert!(!state.is_goal_cancelled().await);
        assert!(state.is_stopped().await);
    }

    #[tokio::test]
    async fn test_stop_is_visible_through_shared_handle() {
        let state = SharedState::new_shared();
        let host_view = Arc::clone(&state);
        assert!(!host_view.is_stopped().await);

        state.signal_stop().await;
        assert!(host_view.is_stopped().await);
        assert!(host_view.status().await.stop);
    }
}
