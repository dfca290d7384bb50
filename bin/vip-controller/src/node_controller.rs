//! Node controller triggering NodePort backfill for joining nodes

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use kube_runtime::watcher::{watcher, Config, Event};
use kube_runtime::WatchStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vip_core::{PollOutcome, VipReconciler};

pub struct NodeController {
    client: Client,
    reconciler: Arc<VipReconciler>,
    shutdown: CancellationToken,
}

impl NodeController {
    pub fn new(client: Client, reconciler: Arc<VipReconciler>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            reconciler,
            shutdown,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting Node watch");

        let nodes: Api<Node> = Api::all(self.client.clone());
        let mut stream = watcher(nodes, Config::default()).default_backoff().boxed();
        let mut tracker = NodeTracker::default();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(node)) | Ok(Event::InitApply(node)) => {
                    if tracker.observe(&node) {
                        self.spawn_backfill(node);
                    }
                }
                Ok(Event::Delete(node)) => tracker.forget(&node),
                Ok(Event::Init) => {
                    debug!("Node watch (re)listing");
                    tracker.begin_relist();
                }
                Ok(Event::InitDone) => tracker.finish_relist(),
                Err(e) => error!("Error in Node watch stream: {}", e),
            }
        }

        Ok(())
    }

    /// Gateway polling can take minutes, so each node gets its own task
    fn spawn_backfill(&self, node: Node) {
        let reconciler = self.reconciler.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let name = node.metadata.name.clone().unwrap_or_default();
            debug!("Waiting for gateway of node {}", name);

            match reconciler.handle_node_port_lb(&node, &cancel).await {
                PollOutcome::Ready(report) => {
                    info!("NodePort VIPs on node {}: {}", name, report)
                }
                PollOutcome::TimedOut | PollOutcome::Cancelled => {
                    debug!("NodePort backfill abandoned for node {}", name)
                }
            }
        });
    }
}

/// Nodes already handed to backfill, keyed by name with their UID.
///
/// A relist replaces the whole set once it completes, so nodes deleted
/// while the watch was down are dropped.
#[derive(Default)]
struct NodeTracker {
    known: HashMap<String, String>,
    relist: Option<HashMap<String, String>>,
}

impl NodeTracker {
    /// Record a node; `true` when it has not been backfilled yet
    fn observe(&mut self, node: &Node) -> bool {
        let Some(name) = node.metadata.name.clone() else {
            return false;
        };
        let uid = node.metadata.uid.clone().unwrap_or_default();
        let is_new = self.known.get(&name) != Some(&uid);

        match self.relist.as_mut() {
            Some(relist) => {
                relist.insert(name, uid);
            }
            None => {
                self.known.insert(name, uid);
            }
        }
        is_new
    }

    fn forget(&mut self, node: &Node) {
        if let Some(name) = node.metadata.name.as_deref() {
            self.known.remove(name);
            if let Some(relist) = self.relist.as_mut() {
                relist.remove(name);
            }
        }
    }

    fn begin_relist(&mut self) {
        self.relist = Some(HashMap::new());
    }

    fn finish_relist(&mut self) {
        if let Some(relist) = self.relist.take() {
            self.known = relist;
        }
    }
}
