//! In-memory fakes and fixtures for reconciler tests

use crate::backend::Protocol;
use crate::config::{ControllerConfig, GatewayPollConfig};
use crate::control::{vip_key, LoadBalancerControl, LoadBalancerRef};
use crate::objects::ClusterObjects;
use crate::reconciler::VipReconciler;
use crate::{CoreError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Service};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn endpoints(namespace: &str, name: &str, subsets: Value) -> Endpoints {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Endpoints",
        "metadata": {"namespace": namespace, "name": name},
        "subsets": subsets,
    }))
    .expect("valid Endpoints fixture")
}

pub fn service(namespace: &str, name: &str, spec: Value) -> Service {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"namespace": namespace, "name": name},
        "spec": spec,
    }))
    .expect("valid Service fixture")
}

pub fn node(name: &str) -> Node {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name},
    }))
    .expect("valid Node fixture")
}

fn namespace(name: &str) -> Namespace {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name},
    }))
    .expect("valid Namespace fixture")
}

pub fn reconciler(
    objects: FakeObjects,
    lbs: Arc<FakeLoadBalancers>,
    nodeport_enable: bool,
) -> VipReconciler {
    let config = ControllerConfig {
        nodeport_enable,
        ..Default::default()
    };
    VipReconciler::new(Arc::new(objects), lbs, &config)
}

pub fn reconciler_with_poll(
    objects: FakeObjects,
    lbs: Arc<FakeLoadBalancers>,
    interval: Duration,
    timeout: Duration,
) -> VipReconciler {
    let config = ControllerConfig {
        nodeport_enable: true,
        gateway_poll: GatewayPollConfig { interval, timeout },
        ..Default::default()
    };
    VipReconciler::new(Arc::new(objects), lbs, &config)
}

#[derive(Default)]
pub struct FakeObjects {
    services: HashMap<(String, String), Service>,
    endpoints: BTreeMap<String, Vec<Endpoints>>,
    failing_namespaces: BTreeSet<String>,
    failing_services: BTreeSet<(String, String)>,
}

impl FakeObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, svc: Service) -> Self {
        let key = (
            svc.metadata.namespace.clone().unwrap_or_default(),
            svc.metadata.name.clone().unwrap_or_default(),
        );
        self.services.insert(key, svc);
        self
    }

    pub fn with_endpoints(mut self, ep: Endpoints) -> Self {
        let ns = ep.metadata.namespace.clone().unwrap_or_default();
        self.endpoints.entry(ns).or_default().push(ep);
        self
    }

    pub fn with_failing_service(mut self, ns: &str, name: &str) -> Self {
        self.failing_services
            .insert((ns.to_string(), name.to_string()));
        self
    }

    pub fn with_failing_namespace(mut self, ns: &str) -> Self {
        self.failing_namespaces.insert(ns.to_string());
        self
    }
}

#[async_trait]
impl ClusterObjects for FakeObjects {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let key = (namespace.to_string(), name.to_string());
        if self.failing_services.contains(&key) {
            return Err(CoreError::Internal(format!("cannot get {}/{}", namespace, name)));
        }
        Ok(self.services.get(&key).cloned())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let names: BTreeSet<&String> = self
            .endpoints
            .keys()
            .chain(self.failing_namespaces.iter())
            .collect();
        Ok(names.into_iter().map(|n| namespace(n)).collect())
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<Endpoints>> {
        if self.failing_namespaces.contains(namespace) {
            return Err(CoreError::Internal(format!("cannot list {}", namespace)));
        }
        Ok(self.endpoints.get(namespace).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create {
        lb: String,
        vip: String,
        port: i32,
        backends: Vec<String>,
        target_port: i32,
    },
    Remove {
        lb: String,
        vip: String,
        port: i32,
    },
}

#[derive(Default)]
struct GatewayObjects {
    routers: Vec<String>,
    lbs: HashMap<(String, Protocol), String>,
    physical_ips: HashMap<String, String>,
}

/// Load-balancer control plane that records calls and keeps VIP state
#[derive(Default)]
pub struct FakeLoadBalancers {
    cluster: HashMap<Protocol, String>,
    default_gateway: HashMap<Protocol, String>,
    failing_vips: HashSet<String>,
    failing_gateways: HashSet<String>,
    fail_gateway_listing: bool,
    gateways: Mutex<GatewayObjects>,
    calls: Mutex<Vec<Call>>,
    vips: Mutex<BTreeMap<(String, String), Vec<String>>>,
}

impl FakeLoadBalancers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster_lbs(self) -> Self {
        self.with_cluster_lb(Protocol::Tcp)
            .with_cluster_lb(Protocol::Udp)
    }

    pub fn with_cluster_lb(mut self, protocol: Protocol) -> Self {
        self.cluster.insert(
            protocol,
            format!("cluster-{}", protocol.as_str().to_lowercase()),
        );
        self
    }

    pub fn with_default_gateway(mut self) -> Self {
        for protocol in Protocol::ALL {
            self.default_gateway.insert(
                protocol,
                format!("default-gw-{}", protocol.as_str().to_lowercase()),
            );
        }
        self
    }

    pub fn with_gateway(self, gateway: &str, physical_ip: &str) -> Self {
        self.add_gateway(gateway, physical_ip);
        self
    }

    /// Gateway whose UDP load balancer never shows up
    pub fn with_partial_gateway(self, gateway: &str, physical_ip: &str) -> Self {
        {
            let mut gateways = self.gateways.lock().unwrap();
            gateways.routers.push(gateway.to_string());
            gateways
                .lbs
                .insert((gateway.to_string(), Protocol::Tcp), format!("{}-tcp", gateway));
            gateways
                .physical_ips
                .insert(gateway.to_string(), physical_ip.to_string());
        }
        self
    }

    pub fn failing_vip(mut self, key: &str) -> Self {
        self.failing_vips.insert(key.to_string());
        self
    }

    /// Gateway whose load-balancer lookups return an error
    pub fn failing_gateway(mut self, gateway: &str) -> Self {
        self.failing_gateways.insert(gateway.to_string());
        self
    }

    pub fn failing_gateway_listing(mut self) -> Self {
        self.fail_gateway_listing = true;
        self
    }

    pub fn add_gateway(&self, gateway: &str, physical_ip: &str) {
        let mut gateways = self.gateways.lock().unwrap();
        gateways.routers.push(gateway.to_string());
        for protocol in Protocol::ALL {
            gateways.lbs.insert(
                (gateway.to_string(), protocol),
                format!("{}-{}", gateway, protocol.as_str().to_lowercase()),
            );
        }
        gateways
            .physical_ips
            .insert(gateway.to_string(), physical_ip.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Current VIPs keyed by (load balancer, `ip:port`)
    pub fn vips(&self) -> BTreeMap<(String, String), Vec<String>> {
        self.vips.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoadBalancerControl for FakeLoadBalancers {
    async fn load_balancer(&self, protocol: Protocol) -> Result<LoadBalancerRef> {
        self.cluster
            .get(&protocol)
            .map(LoadBalancerRef::new)
            .ok_or_else(|| CoreError::LoadBalancerNotFound(protocol.to_string()))
    }

    async fn gateway_routers(&self) -> Result<Vec<String>> {
        if self.fail_gateway_listing {
            return Err(CoreError::Internal("gateway listing failed".to_string()));
        }
        Ok(self.gateways.lock().unwrap().routers.clone())
    }

    async fn gateway_load_balancer(
        &self,
        gateway: &str,
        protocol: Protocol,
    ) -> Result<Option<LoadBalancerRef>> {
        if self.failing_gateways.contains(gateway) {
            return Err(CoreError::Internal(format!("cannot query {}", gateway)));
        }
        Ok(self
            .gateways
            .lock()
            .unwrap()
            .lbs
            .get(&(gateway.to_string(), protocol))
            .map(LoadBalancerRef::new))
    }

    async fn gateway_physical_ip(&self, gateway: &str) -> Result<Option<String>> {
        Ok(self
            .gateways
            .lock()
            .unwrap()
            .physical_ips
            .get(gateway)
            .cloned())
    }

    async fn default_gateway_load_balancer(&self, protocol: Protocol) -> Option<LoadBalancerRef> {
        self.default_gateway.get(&protocol).map(LoadBalancerRef::new)
    }

    async fn create_vip(
        &self,
        lb: &LoadBalancerRef,
        vip: &str,
        port: i32,
        backends: &[String],
        target_port: i32,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Create {
            lb: lb.to_string(),
            vip: vip.to_string(),
            port,
            backends: backends.to_vec(),
            target_port,
        });

        let key = vip_key(vip, port);
        if self.failing_vips.contains(&key) {
            return Err(CoreError::Internal(format!("cannot create {}", key)));
        }
        let targets = backends
            .iter()
            .map(|ip| vip_key(ip, target_port))
            .collect();
        self.vips
            .lock()
            .unwrap()
            .insert((lb.to_string(), key), targets);
        Ok(())
    }

    async fn remove_vip(&self, lb: &LoadBalancerRef, vip: &str, port: i32) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Remove {
            lb: lb.to_string(),
            vip: vip.to_string(),
            port,
        });

        let key = vip_key(vip, port);
        if self.failing_vips.contains(&key) {
            return Err(CoreError::Internal(format!("cannot remove {}", key)));
        }
        self.vips.lock().unwrap().remove(&(lb.to_string(), key));
        Ok(())
    }
}
