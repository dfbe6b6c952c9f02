use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use camera_sweep_client::config::Config;
use camera_sweep_client::controller::{CancelHandle, GoalController};
use camera_sweep_client::error::SweepError;
use camera_sweep_client::goal::GoalOutcome;
use camera_sweep_client::sim_server::SimulatedSweepServer;

/// Camera Sweep Client: request a camera sweep and follow it to completion
#[derive(Parser, Debug)]
#[command(name = "camera-sweep-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of images to capture (default: 10)
    #[arg(short = 'n', long = "images")]
    images: Option<u32>,

    /// Sweep angle in degrees (default: 30.0)
    #[arg(short = 'a', long = "angle", allow_negative_numbers = true)]
    angle: Option<f64>,

    /// Seconds to wait for the action server (omit to wait indefinitely)
    #[arg(long = "server-timeout")]
    server_timeout: Option<u64>,

    /// Config file (TOML format)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("camera_sweep_client=debug,info")
    } else {
        EnvFilter::new("camera_sweep_client=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, SweepError> {
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    config.merge_cli_args(cli.images, cli.angle, cli.server_timeout);
    config.validate()?;

    Ok(config)
}

/// Ctrl+C cancels an accepted goal; otherwise (or a second time) it shuts down
async fn handle_interrupts(cancel: CancelHandle, shutdown_tx: broadcast::Sender<()>) {
    let mut cancel_sent = false;
    while tokio::signal::ctrl_c().await.is_ok() {
        if !cancel_sent {
            match cancel.cancel().await {
                Ok(()) => {
                    info!("Received Ctrl+C, cancelling the goal...");
                    cancel_sent = true;
                    continue;
                }
                Err(e) => debug!("Not cancelling: {}", e),
            }
        }
        info!("Received Ctrl+C, shutting down...");
        let _ = shutdown_tx.send(());
        return;
    }
    warn!("Failed to listen for Ctrl+C");
}

async fn run(config: Config) -> Result<GoalOutcome, SweepError> {
    let goal = config.goal_request();
    let server = SimulatedSweepServer::from_config(&config);

    info!(
        "Starting {} for action '{}'",
        config.client_name.cyan(),
        config.action_name
    );
    match config.server_timeout() {
        Some(limit) => info!("Waiting at most {:?} for the action server", limit),
        None => debug!("Waiting for the action server without a timeout"),
    }

    let mut controller = GoalController::new(config, server);
    let state = Arc::clone(controller.state());

    // Installing our own handler replaces the default Ctrl+C termination.
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(handle_interrupts(controller.cancel_handle(), shutdown_tx));

    let outcome = tokio::select! {
        result = controller.run(goal) => result?,
        _ = shutdown_rx.recv() => {
            warn!("Shutdown signal received");
            return Err(SweepError::ShutdownRequested);
        }
    };

    let status = state.status().await;
    info!(
        "Final status: state = {}, goal_succeeded = {}, goal_cancelled = {}, stop = {}",
        status.state, status.goal_succeeded, status.goal_cancelled, status.stop
    );

    Ok(outcome)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Every outcome that ends the lifecycle counts as a clean exit.
    match run(config).await {
        Ok(GoalOutcome::Succeeded(result)) => {
            println!(
                "\n{} Sweep complete, images at {}",
                "SUCCESS:".green().bold(),
                result.image_path.cyan()
            );
        }
        Ok(GoalOutcome::Rejected) => {
            println!(
                "\n{} The server rejected the goal",
                "REJECTED:".yellow().bold()
            );
        }
        Ok(GoalOutcome::Cancelled) => {
            println!("\n{} The goal was cancelled", "CANCELLED:".yellow().bold());
        }
        Ok(GoalOutcome::Aborted { reason }) => {
            println!(
                "\n{} The server aborted the goal{}",
                "ABORTED:".red().bold(),
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            );
        }
        Err(SweepError::ShutdownRequested) => {
            println!("\n{} Shutdown requested", "INTERRUPTED:".yellow().bold());
            std::process::exit(130);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
