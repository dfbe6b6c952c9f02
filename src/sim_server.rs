//! In-process camera sweep server.
//!
//! Lets the client run end to end without external middleware: goals are
//! validated against the configured limits, and each accepted goal runs as a
//! tokio task that "captures" one image per interval and publishes feedback
//! after every capture.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::channel::{ActionChannel, FeedbackSink};
use crate::config::{Config, ServerConfig};
use crate::error::{Result, SweepError};
use crate::goal::{
    CancelResponse, FeedbackSample, GoalId, GoalRequest, GoalResponse, GoalResult, GoalTermination,
};

/// Bookkeeping for one accepted goal
struct SweepSlot {
    result_rx: Option<oneshot::Receiver<GoalTermination>>,
    cancel_tx: watch::Sender<bool>,
}

/// Simulated action server implementing [`ActionChannel`]
pub struct SimulatedSweepServer {
    action_name: String,
    config: ServerConfig,
    ready_at: Option<Instant>,
    goals: Mutex<HashMap<GoalId, SweepSlot>>,
    sweeps_started: AtomicU32,
}

impl SimulatedSweepServer {
    /// Create a server that becomes ready after `config.startup_delay_ms`
    pub fn new(action_name: impl Into<String>, config: ServerConfig) -> Self {
        let ready_at = Instant::now() + Duration::from_millis(config.startup_delay_ms);
        Self::build(action_name.into(), config, Some(ready_at))
    }

    /// Create a server that never becomes ready
    pub fn offline(action_name: impl Into<String>, config: ServerConfig) -> Self {
        Self::build(action_name.into(), config, None)
    }

    /// Create a server for the action named in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.action_name.clone(), config.server.clone())
    }

    fn build(action_name: String, config: ServerConfig, ready_at: Option<Instant>) -> Self {
        Self {
            action_name,
            config,
            ready_at,
            goals: Mutex::new(HashMap::new()),
            sweeps_started: AtomicU32::new(0),
        }
    }

    /// Why a goal would be rejected, if it would be
    fn rejection_reason(&self, goal: &GoalRequest) -> Option<String> {
        if goal.image_count == 0 {
            return Some("image count must be positive".to_string());
        }
        if goal.image_count > self.config.max_image_count {
            return Some(format!(
                "{} images requested, at most {} allowed",
                goal.image_count, self.config.max_image_count
            ));
        }
        let angle_ok = goal.sweep_angle > 0.0 && goal.sweep_angle <= self.config.max_sweep_angle;
        if !angle_ok {
            return Some(format!(
                "sweep angle {:.1} outside (0, {:.1}] degrees",
                goal.sweep_angle, self.config.max_sweep_angle
            ));
        }
        None
    }
}

#[async_trait]
impl ActionChannel for SimulatedSweepServer {
    fn action_name(&self) -> &str {
        &self.action_name
    }

    fn is_server_ready(&self) -> bool {
        self.ready_at.is_some_and(|at| Instant::now() >= at)
    }

    async fn wait_for_server(&self) {
        match self.ready_at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }

    async fn send_goal(&self, goal: GoalRequest, feedback: FeedbackSink) -> Result<GoalResponse> {
        if let Some(reason) = self.rejection_reason(&goal) {
            debug!("Rejecting goal: {}", reason);
            return Ok(GoalResponse::Rejected);
        }

        let goal_id = GoalId::new();
        let sweep_number = self.sweeps_started.fetch_add(1, Ordering::SeqCst) + 1;
        let image_path = self
            .config
            .image_dir
            .join(format!("sweep_{:03}.jpg", sweep_number))
            .display()
            .to_string();

        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.goals.lock().await.insert(
            goal_id,
            SweepSlot {
                result_rx: Some(result_rx),
                cancel_tx,
            },
        );

        debug!("Starting sweep {} for goal {}", sweep_number, goal_id);
        tokio::spawn(run_sweep(
            goal,
            Duration::from_millis(self.config.capture_interval_ms),
            image_path,
            feedback,
            cancel_rx,
            result_tx,
        ));

        Ok(GoalResponse::Accepted {
            goal_id,
            stamp: Utc::now(),
        })
    }

    async fn get_result(&self, goal_id: GoalId) -> Result<GoalTermination> {
        let result_rx = self
            .goals
            .lock()
            .await
            .get_mut(&goal_id)
            .and_then(|slot| slot.result_rx.take());

        let Some(result_rx) = result_rx else {
            return Err(SweepError::Transport(format!(
                "no pending result for goal {}",
                goal_id
            )));
        };

        let termination = result_rx.await;
        self.goals.lock().await.remove(&goal_id);

        termination.map_err(|_| {
            SweepError::ChannelClosed(format!("sweep for goal {} ended without a result", goal_id))
        })
    }

    async fn cancel_goal(&self, goal_id: GoalId) -> Result<CancelResponse> {
        let goals = self.goals.lock().await;
        let accepted = match goals.get(&goal_id) {
            // The sweep task holds the receiver until it has finished.
            Some(slot) if !slot.cancel_tx.is_closed() => {
                slot.cancel_tx.send_replace(true);
                true
            }
            _ => false,
        };
        debug!("Cancel request for goal {}: accepted = {}", goal_id, accepted);
        Ok(CancelResponse { accepted })
    }
}

/// Capture `image_count` images across the sweep, reporting after each
async fn run_sweep(
    goal: GoalRequest,
    interval: Duration,
    image_path: String,
    feedback: FeedbackSink,
    mut cancel_rx: watch::Receiver<bool>,
    result_tx: oneshot::Sender<GoalTermination>,
) {
    let step = goal.sweep_angle / f64::from(goal.image_count);

    for image in 1..=goal.image_count {
        tokio::select! {
            biased;
            Ok(()) = cancel_rx.changed() => {
                debug!("Sweep cancelled after {} image(s)", image - 1);
                let _ = result_tx.send(GoalTermination::Canceled);
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let sample = FeedbackSample {
            current_angle: step * f64::from(image),
            current_image: image,
        };
        if feedback.send(sample).is_err() {
            debug!("Feedback receiver dropped");
        }
    }

    drop(feedback);
    let _ = result_tx.send(GoalTermination::Succeeded(GoalResult { image_path }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            capture_interval_ms: 1,
            ..ServerConfig::default()
        }
    }

    fn accepted_id(response: GoalResponse) -> GoalId {
        match response {
            GoalResponse::Accepted { goal_id, .. } => goal_id,
            GoalResponse::Rejected => panic!("Expected the goal to be accepted"),
        }
    }

    #[tokio::test]
    async fn test_sweep_reports_every_image_then_result() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let response = server
            .send_goal(GoalRequest::new(30.0, 4), tx)
            .await
            .unwrap();
        let termination = server.get_result(accepted_id(response)).await.unwrap();

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].current_image, 1);
        assert_eq!(samples[0].current_angle, 7.5);
        assert_eq!(samples[3].current_angle, 30.0);
        assert_eq!(
            termination,
            GoalTermination::Succeeded(GoalResult {
                image_path: "/tmp/sweep_001.jpg".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_image_paths_count_up_per_sweep() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());

        for expected in ["/tmp/sweep_001.jpg", "/tmp/sweep_002.jpg"] {
            let (tx, _rx) = mpsc::unbounded_channel();
            let response = server
                .send_goal(GoalRequest::new(10.0, 1), tx)
                .await
                .unwrap();
            let termination = server.get_result(accepted_id(response)).await.unwrap();
            assert_eq!(
                termination,
                GoalTermination::Succeeded(GoalResult {
                    image_path: expected.to_string()
                })
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_goals_outside_limits() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());

        for goal in [
            GoalRequest::new(30.0, 0),
            GoalRequest::new(30.0, 51),
            GoalRequest::new(0.0, 5),
            GoalRequest::new(-10.0, 5),
            GoalRequest::new(181.0, 5),
            GoalRequest::new(f64::NAN, 5),
        ] {
            let (tx, _rx) = mpsc::unbounded_channel();
            let response = server.send_goal(goal, tx).await.unwrap();
            assert_eq!(response, GoalResponse::Rejected, "{:?}", goal);
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_sweep_early() {
        let config = ServerConfig {
            capture_interval_ms: 50,
            ..ServerConfig::default()
        };
        let server = SimulatedSweepServer::new("camera_sweep", config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let goal_id = accepted_id(
            server
                .send_goal(GoalRequest::new(90.0, 20), tx)
                .await
                .unwrap(),
        );
        let cancel = server.cancel_goal(goal_id).await.unwrap();
        assert!(cancel.accepted);

        let termination = server.get_result(goal_id).await.unwrap();
        assert_eq!(termination, GoalTermination::Canceled);

        let mut captured = 0;
        while rx.recv().await.is_some() {
            captured += 1;
        }
        assert!(captured < 20);
    }

    #[tokio::test]
    async fn test_cancel_refused_for_finished_or_unknown_goal() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());
        let (tx, _rx) = mpsc::unbounded_channel();

        let goal_id = accepted_id(
            server
                .send_goal(GoalRequest::new(10.0, 1), tx)
                .await
                .unwrap(),
        );
        server.get_result(goal_id).await.unwrap();
        // Give the finished task a chance to drop its receiver.
        tokio::task::yield_now().await;

        assert!(!server.cancel_goal(goal_id).await.unwrap().accepted);
        assert!(!server.cancel_goal(GoalId::new()).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_result_can_only_be_claimed_once() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());
        let (tx, _rx) = mpsc::unbounded_channel();

        let goal_id = accepted_id(
            server
                .send_goal(GoalRequest::new(10.0, 1), tx)
                .await
                .unwrap(),
        );
        server.get_result(goal_id).await.unwrap();

        let second = server.get_result(goal_id).await;
        assert!(matches!(second, Err(SweepError::Transport(_))));
    }

    #[tokio::test]
    async fn test_finished_goals_are_forgotten() {
        let server = SimulatedSweepServer::new("camera_sweep", fast_config());

        for _ in 0..3 {
            let (tx, _rx) = mpsc::unbounded_channel();
            let goal_id = accepted_id(
                server
                    .send_goal(GoalRequest::new(10.0, 1), tx)
                    .await
                    .unwrap(),
            );
            assert!(server.goals.lock().await.contains_key(&goal_id));

            server.get_result(goal_id).await.unwrap();
            assert!(server.goals.lock().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_readiness_follows_startup_delay() {
        let config = ServerConfig {
            startup_delay_ms: 20,
            ..fast_config()
        };
        let server = SimulatedSweepServer::new("camera_sweep", config);
        assert!(!server.is_server_ready());

        server.wait_for_server().await;
        assert!(server.is_server_ready());

        let offline = SimulatedSweepServer::offline("camera_sweep", fast_config());
        assert!(!offline.is_server_ready());
    }
}
