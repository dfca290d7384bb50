//! Endpoints controller driving VIP sync and teardown

use futures::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client};
use kube_runtime::watcher::{watcher, Config, Event};
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use tracing::{debug, error, info};
use vip_core::objects::object_key;
use vip_core::VipReconciler;

pub struct EndpointsController {
    client: Client,
    reconciler: Arc<VipReconciler>,
}

impl EndpointsController {
    pub fn new(client: Client, reconciler: Arc<VipReconciler>) -> Self {
        Self { client, reconciler }
    }

    /// Process Endpoints events one at a time until the watch ends
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting Endpoints reconciliation");

        let endpoints: Api<Endpoints> = Api::all(self.client.clone());
        let mut stream = watcher(endpoints, Config::default())
            .default_backoff()
            .boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(ep)) | Ok(Event::InitApply(ep)) => {
                    debug!("Reconciling Endpoints: {}", object_key(&ep.metadata));
                    let report = self.reconciler.sync_endpoints(&ep).await;
                    if !report.is_clean() {
                        debug!(
                            "Endpoints {} synced with gaps: {:?}",
                            object_key(&ep.metadata),
                            report.skipped
                        );
                    }
                }
                Ok(Event::Delete(ep)) => {
                    debug!("Deleting Endpoints: {}", object_key(&ep.metadata));
                    self.reconciler.delete_endpoints(&ep).await;
                }
                Ok(Event::Init) => debug!("Endpoints watch (re)listing"),
                Ok(Event::InitDone) => info!("Initial Endpoints sync complete"),
                Err(e) => error!("Error in Endpoints watch stream: {}", e),
            }
        }

        Ok(())
    }
}
