//! Camera Sweep Client: an async action client that asks a camera sweep
//! server to capture a series of images and follows the goal to completion.
//!
//! The crate centres on [`GoalController`], which drives a single goal
//! through submission, acceptance, feedback and its terminal result over any
//! [`ActionChannel`] implementation.

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod goal;
pub mod sim_server;
pub mod state;

pub use channel::{ActionChannel, GoalHandle};
pub use config::Config;
pub use controller::{CancelHandle, GoalController};
pub use error::{Result, SweepError};
pub use goal::{FeedbackSample, GoalOutcome, GoalRequest, GoalResult};
pub use sim_server::SimulatedSweepServer;
pub use state::{ClientStatus, GoalState, SharedState};
