//! NodePort backfill once a joining node's gateway is provisioned

use crate::backend::{BackendTable, Protocol};
use crate::control::{gateway_router_name, LoadBalancerRef};
use crate::objects::service_type_has_node_port;
use crate::reconciler::{declared_ports, VipReconciler};
use crate::report::SyncReport;
use crate::wait::{poll_until, PollOutcome};
use crate::Result;
use k8s_openapi::api::core::v1::Node;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Gateway objects of a node, all present
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayState {
    pub gateway: String,
    pub tcp_lb: LoadBalancerRef,
    pub udp_lb: LoadBalancerRef,
    pub physical_ip: String,
}

impl GatewayState {
    pub fn load_balancer(&self, protocol: Protocol) -> &LoadBalancerRef {
        match protocol {
            Protocol::Tcp => &self.tcp_lb,
            Protocol::Udp => &self.udp_lb,
        }
    }
}

impl VipReconciler {
    /// Wait for a new node's gateway, then bind every NodePort service on it.
    ///
    /// Timeout and cancellation abandon the node without creating any VIP.
    pub async fn handle_node_port_lb(
        &self,
        node: &Node,
        cancel: &CancellationToken,
    ) -> PollOutcome<SyncReport> {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let gateway = gateway_router_name(node_name);

        let outcome = poll_until(
            self.gateway_poll.interval,
            self.gateway_poll.timeout,
            cancel,
            || self.probe_gateway(&gateway),
        )
        .await;

        let state = match outcome {
            PollOutcome::Ready(state) => state,
            PollOutcome::TimedOut => {
                error!(
                    "timed out waiting for load balancer to be ready on node {:?}",
                    node_name
                );
                return PollOutcome::TimedOut;
            }
            PollOutcome::Cancelled => {
                warn!(
                    "stopped waiting for load balancer to be ready on node {:?}",
                    node_name
                );
                return PollOutcome::Cancelled;
            }
        };

        debug!(
            gateway = %state.gateway,
            tcp = %state.tcp_lb,
            udp = %state.udp_lb,
            physical_ip = %state.physical_ip,
            "Gateway ready"
        );

        let report = self.backfill_node_ports(&state).await;
        info!(node = node_name, "NodePort backfill finished: {}", report);
        PollOutcome::Ready(report)
    }

    /// Probe all three gateway objects. `None` until every one exists.
    async fn probe_gateway(&self, gateway: &str) -> Option<GatewayState> {
        let tcp_lb = ready(
            self.lb.gateway_load_balancer(gateway, Protocol::Tcp).await,
            gateway,
            "TCP load balancer",
        );
        let udp_lb = ready(
            self.lb.gateway_load_balancer(gateway, Protocol::Udp).await,
            gateway,
            "UDP load balancer",
        );
        let physical_ip = ready(
            self.lb.gateway_physical_ip(gateway).await,
            gateway,
            "physical IP",
        );

        Some(GatewayState {
            gateway: gateway.to_string(),
            tcp_lb: tcp_lb?,
            udp_lb: udp_lb?,
            physical_ip: physical_ip.filter(|ip| !ip.is_empty())?,
        })
    }

    /// Create `physical_ip:nodePort` VIPs for every NodePort service
    async fn backfill_node_ports(&self, state: &GatewayState) -> SyncReport {
        let mut report = SyncReport::new();

        let namespaces = match self.objects.list_namespaces().await {
            Ok(namespaces) => namespaces,
            Err(e) => {
                error!("failed to get k8s namespaces: {}", e);
                report.skip(format!("namespaces: {}", e));
                return report;
            }
        };

        for ns in namespaces {
            let Some(ns_name) = ns.metadata.name.as_deref() else {
                continue;
            };
            let endpoints = match self.objects.list_endpoints(ns_name).await {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    error!("failed to get k8s endpoints in {}: {}", ns_name, e);
                    report.skip(format!("endpoints in {}: {}", ns_name, e));
                    continue;
                }
            };

            for ep in &endpoints {
                let Some(name) = ep.metadata.name.as_deref() else {
                    continue;
                };
                let namespace = ep.metadata.namespace.as_deref().unwrap_or(ns_name);
                let svc = match self.objects.get_service(namespace, name).await {
                    Ok(Some(svc)) => svc,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("failed to get service {}/{}: {}", namespace, name, e);
                        report.skip(format!("service {}/{}: {}", namespace, name, e));
                        continue;
                    }
                };
                if !service_type_has_node_port(&svc) {
                    continue;
                }

                let table = BackendTable::from_endpoints(ep);
                for protocol in Protocol::ALL {
                    let lb = state.load_balancer(protocol);
                    for (port_name, backends) in table.ports(protocol) {
                        for svc_port in declared_ports(&svc, protocol, port_name) {
                            let Some(node_port) = svc_port.node_port else {
                                continue;
                            };
                            if let Err(e) = self
                                .create_vip(lb, &state.physical_ip, node_port, backends, &mut report)
                                .await
                            {
                                error!("failed to create VIP in load balancer {} - {}", lb, e);
                            }
                        }
                    }
                }
            }
        }

        report
    }
}

fn ready<T>(result: Result<Option<T>>, gateway: &str, what: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!("{} of gateway {} not available: {}", what, gateway, e);
            None
        }
    }
}
