use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SweepError};
use crate::goal::{GoalRequest, DEFAULT_IMAGE_COUNT, DEFAULT_SWEEP_ANGLE};

/// Parameters of the sweep goal to request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    /// Number of images to capture
    #[serde(default = "default_image_count")]
    pub image_count: u32,
    /// Sweep angle in degrees
    #[serde(default = "default_sweep_angle")]
    pub sweep_angle: f64,
}

fn default_image_count() -> u32 {
    DEFAULT_IMAGE_COUNT
}

fn default_sweep_angle() -> f64 {
    DEFAULT_SWEEP_ANGLE
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            image_count: default_image_count(),
            sweep_angle: default_sweep_angle(),
        }
    }
}

/// Behaviour of the in-process simulated sweep server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Delay before the server reports ready
    #[serde(default)]
    pub startup_delay_ms: u64,
    /// Time spent capturing each image
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
    /// Goals sweeping further than this are rejected
    #[serde(default = "default_max_sweep_angle")]
    pub max_sweep_angle: f64,
    /// Goals asking for more images than this are rejected
    #[serde(default = "default_max_image_count")]
    pub max_image_count: u32,
    /// Directory the reported image paths point into
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
}

fn default_capture_interval_ms() -> u64 {
    500
}

fn default_max_sweep_angle() -> f64 {
    180.0
}

fn default_max_image_count() -> u32 {
    50
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 0,
            capture_interval_ms: default_capture_interval_ms(),
            max_sweep_angle: default_max_sweep_angle(),
            max_image_count: default_max_image_count(),
            image_dir: default_image_dir(),
        }
    }
}

/// Main configuration for the camera sweep client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the action endpoint
    #[serde(default = "default_action_name")]
    pub action_name: String,
    /// Name this client identifies itself with
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Goal parameters
    #[serde(default)]
    pub goal: GoalConfig,
    /// How long to wait for the server to become ready (None = wait forever)
    #[serde(default)]
    pub server_timeout_secs: Option<u64>,
    /// Simulated server settings
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_action_name() -> String {
    "camera_sweep".to_string()
}

fn default_client_name() -> String {
    "camera_sweep_action_client".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action_name: default_action_name(),
            client_name: default_client_name(),
            goal: GoalConfig::default(),
            server_timeout_secs: None,
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SweepError::ConfigError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| SweepError::ConfigError(e.to_string()))
    }

    /// Merge CLI arguments into this configuration
    /// CLI arguments take precedence over config file values
    pub fn merge_cli_args(
        &mut self,
        image_count: Option<u32>,
        sweep_angle: Option<f64>,
        server_timeout_secs: Option<u64>,
    ) {
        if let Some(n) = image_count {
            self.goal.image_count = n;
        }
        if let Some(a) = sweep_angle {
            self.goal.sweep_angle = a;
        }
        if server_timeout_secs.is_some() {
            self.server_timeout_secs = server_timeout_secs;
        }
    }

    /// Reject goal parameters that can never form a valid request
    pub fn validate(&self) -> Result<()> {
        if self.goal.image_count == 0 {
            return Err(SweepError::InvalidGoal(
                "image count must be a positive integer".to_string(),
            ));
        }
        if !self.goal.sweep_angle.is_finite() {
            return Err(SweepError::InvalidGoal(format!(
                "sweep angle must be a finite number of degrees, got {}",
                self.goal.sweep_angle
            )));
        }
        if self.action_name.is_empty() {
            return Err(SweepError::ConfigError("action name is empty".to_string()));
        }
        Ok(())
    }

    /// Build the goal this configuration describes
    pub fn goal_request(&self) -> GoalRequest {
        GoalRequest::new(self.goal.sweep_angle, self.goal.image_count)
    }

    /// The bounded wait for the server, if one was configured
    pub fn server_timeout(&self) -> Option<Duration> {
        self.server_timeout_secs.map(Duration::from_secs)
    }
}
