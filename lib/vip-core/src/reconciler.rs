//! Reconciles Endpoints into load-balancer VIPs

use crate::backend::{BackendTable, PortBackends, Protocol};
use crate::config::{ControllerConfig, GatewayPollConfig};
use crate::control::{vip_key, LoadBalancerControl, LoadBalancerRef};
use crate::objects::{
    cluster_ip, object_key, service_type_has_cluster_ip, service_type_has_node_port,
    ClusterObjects,
};
use crate::report::{SyncReport, VipAction};
use crate::Result;
use k8s_openapi::api::core::v1::{Endpoints, Service, ServicePort};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// VipReconciler turns Endpoints changes into VIP upserts and removals.
///
/// Every pass is best effort: a failed lookup or mutation is logged,
/// recorded in the returned [`SyncReport`] and the pass moves on.
pub struct VipReconciler {
    pub(crate) objects: Arc<dyn ClusterObjects>,
    pub(crate) lb: Arc<dyn LoadBalancerControl>,
    pub(crate) nodeport_enable: bool,
    pub(crate) gateway_poll: GatewayPollConfig,
}

impl VipReconciler {
    pub fn new(
        objects: Arc<dyn ClusterObjects>,
        lb: Arc<dyn LoadBalancerControl>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            objects,
            lb,
            nodeport_enable: config.nodeport_enable,
            gateway_poll: config.gateway_poll.clone(),
        }
    }

    /// Program cluster, NodePort and external-IP VIPs for an added or
    /// updated Endpoints object
    pub async fn sync_endpoints(&self, ep: &Endpoints) -> SyncReport {
        let mut report = SyncReport::new();

        let Some(svc) = self.lookup_service(ep).await else {
            return report;
        };
        let Some(svc_ip) = cluster_ip(&svc) else {
            debug!(
                "Skipping service {} due to clusterIP = {:?}",
                object_key(&svc.metadata),
                svc.spec.as_ref().and_then(|s| s.cluster_ip.as_deref())
            );
            return report;
        };

        let svc_key = object_key(&svc.metadata);
        let program_node_ports = self.nodeport_enable && service_type_has_node_port(&svc);
        let program_cluster_ip = service_type_has_cluster_ip(&svc);
        let table = BackendTable::from_endpoints(ep);

        for protocol in Protocol::ALL {
            for (port_name, backends) in table.ports(protocol) {
                for svc_port in declared_ports(&svc, protocol, port_name) {
                    if program_node_ports {
                        if let Some(node_port) = svc_port.node_port {
                            debug!(
                                "Creating Gateways IP for NodePort: {}, {:?}",
                                node_port, backends.backends
                            );
                            if let Err(e) = self
                                .create_gateways_vip(protocol, node_port, backends, &mut report)
                                .await
                            {
                                error!(
                                    "Error in creating Node Port for svc {}, node port: {} - {}",
                                    svc_key, node_port, e
                                );
                                report.skip(format!("{} node port {}: {}", svc_key, node_port, e));
                                continue;
                            }
                        }
                    }

                    if !program_cluster_ip {
                        continue;
                    }

                    let lb = match self.lb.load_balancer(protocol).await {
                        Ok(lb) => lb,
                        Err(e) => {
                            error!("Failed to get loadbalancer for {} ({})", protocol, e);
                            report.skip(format!("{} load balancer: {}", protocol, e));
                            continue;
                        }
                    };

                    if let Err(e) = self
                        .create_vip(&lb, svc_ip, svc_port.port, backends, &mut report)
                        .await
                    {
                        error!(
                            "Error in creating Cluster IP for svc {}, target port: {} - {}",
                            svc_key, backends.target_port, e
                        );
                        continue;
                    }

                    let external = self.handle_external_ips(&svc, svc_port, backends).await;
                    report.merge(external);
                }
            }
        }

        info!(service = %svc_key, "Synced endpoints: {}", report);
        report
    }

    /// Create one VIP per external IP of the service on the default gateway
    pub async fn handle_external_ips(
        &self,
        svc: &Service,
        svc_port: &ServicePort,
        backends: &PortBackends,
    ) -> SyncReport {
        let mut report = SyncReport::new();
        let svc_key = object_key(&svc.metadata);
        debug!("handling external IPs for svc {}", svc_key);

        let external_ips = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.external_ips.as_deref())
            .unwrap_or_default();
        if external_ips.is_empty() {
            return report;
        }

        let Some(protocol) = Protocol::from_k8s(svc_port.protocol.as_deref()) else {
            return report;
        };

        for external_ip in external_ips {
            let Some(lb) = self.lb.default_gateway_load_balancer(protocol).await else {
                warn!(
                    "No default gateway found for protocol {}. \
                     Note: 'nodeport' flag needs to be enabled for default gateway",
                    protocol
                );
                report.skip(format!("{} external IP {}: no default gateway", svc_key, external_ip));
                continue;
            };

            if let Err(e) = self
                .create_vip(&lb, external_ip, svc_port.port, backends, &mut report)
                .await
            {
                error!(
                    "Error in creating external IP for service: {}, externalIP: {} - {}",
                    svc_key, external_ip, e
                );
            }
        }

        report
    }

    /// Bind a node port on every gateway router's load balancer
    async fn create_gateways_vip(
        &self,
        protocol: Protocol,
        node_port: i32,
        backends: &PortBackends,
        report: &mut SyncReport,
    ) -> Result<()> {
        let gateways = self.lb.gateway_routers().await?;

        for gateway in gateways {
            let lb = match self.lb.gateway_load_balancer(&gateway, protocol).await {
                Ok(Some(lb)) => lb,
                Ok(None) => {
                    debug!("Gateway {} has no {} load balancer yet", gateway, protocol);
                    continue;
                }
                Err(e) => {
                    error!("physical gateway {} does not have load_balancer ({})", gateway, e);
                    report.skip(format!("{} {} load balancer: {}", gateway, protocol, e));
                    continue;
                }
            };

            let physical_ip = match self.lb.gateway_physical_ip(&gateway).await {
                Ok(Some(ip)) => ip,
                Ok(None) => {
                    debug!("Gateway {} has no physical IP yet", gateway);
                    continue;
                }
                Err(e) => {
                    error!("physical gateway {} does not have physical ip ({})", gateway, e);
                    report.skip(format!("{} physical IP: {}", gateway, e));
                    continue;
                }
            };

            if let Err(e) = self
                .create_vip(&lb, &physical_ip, node_port, backends, report)
                .await
            {
                error!("Failed to create VIP in load balancer {} - {}", lb, e);
            }
        }

        Ok(())
    }

    /// Upsert a VIP and record the outcome
    pub(crate) async fn create_vip(
        &self,
        lb: &LoadBalancerRef,
        vip: &str,
        port: i32,
        backends: &PortBackends,
        report: &mut SyncReport,
    ) -> Result<()> {
        let result = self
            .lb
            .create_vip(lb, vip, port, &backends.backends, backends.target_port)
            .await;
        report.record(
            VipAction::Create,
            lb,
            vip_key(vip, port),
            result.as_ref().err().map(ToString::to_string),
        );
        result
    }

    /// Service owning an Endpoints object. Absence is not an error.
    pub(crate) async fn lookup_service(&self, ep: &Endpoints) -> Option<Service> {
        let name = ep.metadata.name.as_deref()?;
        let namespace = ep.metadata.namespace.as_deref().unwrap_or("default");

        match self.objects.get_service(namespace, name).await {
            Ok(Some(svc)) => Some(svc),
            Ok(None) => {
                debug!(
                    "no service found for endpoint {} in namespace {}",
                    name, namespace
                );
                None
            }
            Err(e) => {
                warn!(
                    "failed to get service for endpoint {} in namespace {}: {}",
                    name, namespace, e
                );
                None
            }
        }
    }
}

/// Declared service ports matching a protocol and port name
pub(crate) fn declared_ports<'a>(
    svc: &'a Service,
    protocol: Protocol,
    port_name: &'a str,
) -> impl Iterator<Item = &'a ServicePort> + 'a {
    svc.spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .filter(move |port| {
            Protocol::from_k8s(port.protocol.as_deref()) == Some(protocol)
                && port.name.as_deref().unwrap_or_default() == port_name
        })
}
