use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::fmt::init as tracing_init;
use vip_core::{ControllerConfig, VipReconciler};
use vip_ovn::{KubeObjects, NbctlClient};

mod endpoints_controller;
mod node_controller;

use endpoints_controller::EndpointsController;
use node_controller::NodeController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting vip-controller...");

    let config = ControllerConfig::from_env()?;
    info!("  - NodePort VIPs: {}", config.nodeport_enable);
    info!(
        "  - Gateway poll: every {:?} for up to {:?}",
        config.gateway_poll.interval, config.gateway_poll.timeout
    );
    info!(
        "  - ovn-nbctl: {} (timeout {:?})",
        config.nbctl_path, config.nbctl_timeout
    );

    let client = Client::try_default().await?;
    let objects = Arc::new(KubeObjects::from_client(client.clone()));
    let lbs = Arc::new(NbctlClient::from_config(&config));
    let reconciler = Arc::new(VipReconciler::new(objects, lbs, &config));
    let shutdown = CancellationToken::new();

    let endpoints_controller = EndpointsController::new(client.clone(), reconciler.clone());
    tokio::spawn(async move {
        if let Err(e) = endpoints_controller.run().await {
            error!("Endpoints controller error: {}", e);
        }
    });

    if config.nodeport_enable {
        let node_controller = NodeController::new(client, reconciler, shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = node_controller.run().await {
                error!("Node controller error: {}", e);
            }
        });
    } else {
        info!("NodePort VIPs disabled, not watching nodes");
    }

    // Keep the process alive
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");
    shutdown.cancel();

    Ok(())
}
