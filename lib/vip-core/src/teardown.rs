//! Cluster VIP removal for deleted Endpoints

use crate::backend::Protocol;
use crate::control::vip_key;
use crate::objects::cluster_ip;
use crate::reconciler::VipReconciler;
use crate::report::{SyncReport, VipAction};
use k8s_openapi::api::core::v1::Endpoints;
use tracing::{debug, error, info};

impl VipReconciler {
    /// Remove the `clusterIP:port` VIP of every declared service port.
    ///
    /// NodePort and external-IP VIPs are left untouched.
    pub async fn delete_endpoints(&self, ep: &Endpoints) -> SyncReport {
        let mut report = SyncReport::new();

        let Some(svc) = self.lookup_service(ep).await else {
            return report;
        };
        let Some(svc_ip) = cluster_ip(&svc) else {
            return report;
        };

        for svc_port in svc.spec.iter().flat_map(|spec| spec.ports.iter().flatten()) {
            let Some(protocol) = Protocol::from_k8s(svc_port.protocol.as_deref()) else {
                debug!(
                    "Skipping port {} with unsupported protocol {:?}",
                    svc_port.port, svc_port.protocol
                );
                continue;
            };

            let lb = match self.lb.load_balancer(protocol).await {
                Ok(lb) => lb,
                Err(e) => {
                    error!("Failed to get load-balancer for {} ({})", protocol, e);
                    report.skip(format!("{} load balancer: {}", protocol, e));
                    continue;
                }
            };

            let result = self.lb.remove_vip(&lb, svc_ip, svc_port.port).await;
            if let Err(e) = &result {
                error!("Error in deleting endpoints for lb {} ({})", lb, e);
            }
            report.record(
                VipAction::Remove,
                &lb,
                vip_key(svc_ip, svc_port.port),
                result.err().map(|e| e.to_string()),
            );
        }

        info!("Deleted endpoints VIPs: {}", report);
        report
    }
}
