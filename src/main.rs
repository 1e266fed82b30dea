//! Peerwatch daemon entry point.

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;

use peerwatch::config::{Cli, Config};
use peerwatch::control_plane::KubeControlPlane;
use peerwatch::reconcile::{self, Context, Outcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cli = Cli::parse();
    let cfg = Config::load(&cli).unwrap_or_else(|e| {
        error!("{}. Continuing with defaults and command-line flags.", e);
        Config::from_cli(&cli)
    });
    info!(
        "Watching endpoints for service: {}/{} [peerPort: {}, apiPort: {}]",
        cfg.namespace, cfg.service, cfg.peer_port, cfg.api_port
    );

    // Control plane; stays without a client if credentials cannot be resolved
    let control_plane = KubeControlPlane::connect(&cfg.kubeconfig).await;
    let ctx = Context {
        config: cfg,
        control_plane,
    };

    // Reconciliation loop
    let reconcile_handle = tokio::spawn(async move {
        match reconcile::run(&ctx).await {
            Outcome::SubscribeFailed => warn!("No endpoints watch, idling"),
            Outcome::StreamClosed { .. } => warn!("Reconciliation stopped, idling"),
        }
    });

    // Runs until interrupted, also after the loop has stopped
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }

    reconcile_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
