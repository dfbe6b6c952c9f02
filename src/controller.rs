use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::{ActionChannel, GoalHandle};
use crate::config::Config;
use crate::error::{Result, SweepError};
use crate::feedback;
use crate::goal::{FeedbackSample, GoalOutcome, GoalRequest, GoalResponse, GoalTermination};
use crate::state::{GoalState, Notification, SharedState};

/// Requests cancellation of the goal a controller is running.
///
/// Obtained from [`GoalController::cancel_handle`] before calling `run`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<SharedState>,
    tx: mpsc::Sender<()>,
}

impl CancelHandle {
    /// Ask for the running goal to be cancelled; only valid once accepted
    pub async fn cancel(&self) -> Result<()> {
        let state = self.state.goal_state().await;
        if state != GoalState::Accepted {
            return Err(SweepError::CancelNotAllowed(state));
        }
        match self.tx.try_send(()) {
            // A request is already queued; one is enough.
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SweepError::ChannelClosed(
                "goal controller is gone".to_string(),
            )),
        }
    }
}

/// Drives exactly one goal through its lifecycle on an action channel
pub struct GoalController<C: ActionChannel> {
    config: Arc<Config>,
    channel: Arc<C>,
    state: Arc<SharedState>,
    cancel_tx: mpsc::Sender<()>,
    cancel_rx: Option<mpsc::Receiver<()>>,
    handle: Option<GoalHandle>,
}

impl<C: ActionChannel> GoalController<C> {
    /// Create a new GoalController
    pub fn new(config: Config, channel: C) -> Self {
        Self::with_state(config, Arc::new(channel), SharedState::new_shared())
    }

    /// Create a new GoalController over a shared channel and state
    pub fn with_state(config: Config, channel: Arc<C>, state: Arc<SharedState>) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        Self {
            config: Arc::new(config),
            channel,
            state,
            cancel_tx,
            cancel_rx: Some(cancel_rx),
            handle: None,
        }
    }

    /// Get a reference to the shared state
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Get a reference to the config
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The handle of the goal, while it is accepted and not yet finished
    pub fn handle(&self) -> Option<GoalHandle> {
        self.handle
    }

    /// Get a handle that can cancel the goal once it has been accepted
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
            tx: self.cancel_tx.clone(),
        }
    }

    /// Submit the goal and follow it until it terminates
    pub async fn run(&mut self, goal: GoalRequest) -> Result<GoalOutcome> {
        let Some(mut cancel_rx) = self.cancel_rx.take() else {
            return Err(SweepError::GoalAlreadySubmitted(
                self.state.goal_state().await,
            ));
        };

        let (response, mut feedback_rx) = self.submit(goal).await?;
        // Nothing may arrive before the server has answered.
        self.drain_feedback(&mut feedback_rx).await?;

        let Some(handle) = self.on_goal_response(response).await? else {
            self.drain_feedback(&mut feedback_rx).await?;
            return Ok(GoalOutcome::Rejected);
        };

        let channel = Arc::clone(&self.channel);
        let result = channel.get_result(handle.goal_id());
        tokio::pin!(result);
        let mut cancel_requested = false;

        let termination = loop {
            tokio::select! {
                biased;
                Some(sample) = feedback_rx.recv() => {
                    self.on_feedback(sample).await?;
                }
                Some(()) = cancel_rx.recv(), if !cancel_requested => {
                    cancel_requested = true;
                    self.request_cancel(handle).await;
                }
                termination = &mut result => break termination?,
            }
        };

        let outcome = self.on_result(termination).await?;
        self.drain_feedback(&mut feedback_rx).await?;
        Ok(outcome)
    }

    /// Wait for the server and send the goal.
    ///
    /// Returns the server's response together with the stream the goal's
    /// feedback will arrive on.
    pub async fn submit(
        &mut self,
        goal: GoalRequest,
    ) -> Result<(GoalResponse, mpsc::UnboundedReceiver<FeedbackSample>)> {
        let current = self.state.goal_state().await;
        if current != GoalState::Idle {
            return Err(SweepError::GoalAlreadySubmitted(current));
        }

        self.wait_for_server().await?;
        self.state.begin_submission().await?;

        info!(
            "Sending goal to '{}': sweep {:.1} degrees, {} image(s)",
            self.channel.action_name(),
            goal.sweep_angle,
            goal.image_count
        );

        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let response = self.channel.send_goal(goal, feedback_tx).await?;
        Ok((response, feedback_rx))
    }

    /// Handle the server's decision on the submitted goal
    pub async fn on_goal_response(&mut self, response: GoalResponse) -> Result<Option<GoalHandle>> {
        match GoalHandle::from_response(response) {
            None => {
                self.state
                    .transition(Notification::GoalResponse, GoalState::Rejected)
                    .await?;
                warn!("The goal was rejected by the server.");
                self.state.signal_stop().await;
                Ok(None)
            }
            Some(handle) => {
                self.state
                    .transition(Notification::GoalResponse, GoalState::Accepted)
                    .await?;
                info!("The goal was accepted by the server.");
                debug!(
                    "Goal {} accepted at {}",
                    handle.goal_id(),
                    handle.accepted_at()
                );
                self.handle = Some(handle);
                Ok(Some(handle))
            }
        }
    }

    /// Report one feedback sample
    pub async fn on_feedback(&self, sample: FeedbackSample) -> Result<()> {
        self.state.check_feedback_allowed().await?;
        info!("{}", feedback::render(&sample));
        Ok(())
    }

    /// Handle the terminal notification of the accepted goal
    pub async fn on_result(&mut self, termination: GoalTermination) -> Result<GoalOutcome> {
        let outcome = match termination {
            GoalTermination::Succeeded(result) => {
                self.state
                    .transition(Notification::Result, GoalState::Succeeded)
                    .await?;
                info!("{}", feedback::render_result(&result));
                self.state.set_goal_succeeded().await;
                GoalOutcome::Succeeded(result)
            }
            GoalTermination::Canceled => {
                self.state
                    .transition(Notification::Result, GoalState::Cancelled)
                    .await?;
                info!("The goal was cancelled.");
                self.state.set_goal_cancelled().await;
                GoalOutcome::Cancelled
            }
            GoalTermination::Aborted { reason } => {
                self.state
                    .transition(Notification::Result, GoalState::Aborted)
                    .await?;
                match &reason {
                    Some(r) => error!("The goal was aborted by the server: {}", r),
                    None => error!("The goal was aborted by the server."),
                }
                GoalOutcome::Aborted { reason }
            }
        };

        self.handle = None;
        self.state.signal_stop().await;
        Ok(outcome)
    }

    async fn wait_for_server(&self) -> Result<()> {
        if self.channel.is_server_ready() {
            return Ok(());
        }

        info!(
            "Waiting for action server '{}'...",
            self.channel.action_name()
        );
        match self.config.server_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.channel.wait_for_server())
                .await
                .map_err(|_| SweepError::ServerUnavailable {
                    action: self.channel.action_name().to_string(),
                    waited: limit,
                }),
            None => {
                self.channel.wait_for_server().await;
                Ok(())
            }
        }
    }

    /// The goal keeps running unless the server confirms the cancel with its result
    async fn request_cancel(&self, handle: GoalHandle) {
        info!("Requesting cancellation of goal {}", handle.goal_id());
        match self.channel.cancel_goal(handle.goal_id()).await {
            Ok(response) if response.accepted => {
                info!("The server accepted the cancel request.");
            }
            Ok(_) => warn!("The server refused to cancel the goal."),
            Err(e) => warn!("Cancel request failed: {}", e),
        }
    }

    /// Feedback queued outside `Accepted` breaks the ordering contract
    async fn drain_feedback(
        &self,
        feedback_rx: &mut mpsc::UnboundedReceiver<FeedbackSample>,
    ) -> Result<()> {
        while let Ok(sample) = feedback_rx.try_recv() {
            self.on_feedback(sample).await?;
        }
        Ok(())
    }
}
