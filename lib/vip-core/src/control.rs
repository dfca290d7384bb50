//! Load-balancer control plane interface

use crate::{Protocol, Result};
use async_trait::async_trait;
use std::fmt;

/// Opaque handle of a load-balancer object owned by the control plane
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadBalancerRef(String);

impl LoadBalancerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadBalancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the gateway router provisioned for a node
pub fn gateway_router_name(node_name: &str) -> String {
    format!("GR_{}", node_name)
}

/// Lookups and VIP mutations against the load-balancer control plane.
///
/// Load balancers are never created or destroyed through this trait, only
/// the VIP entries inside them.
#[async_trait]
pub trait LoadBalancerControl: Send + Sync {
    /// Cluster-wide load balancer for a protocol
    async fn load_balancer(&self, protocol: Protocol) -> Result<LoadBalancerRef>;

    /// Every gateway router currently bound to a chassis
    async fn gateway_routers(&self) -> Result<Vec<String>>;

    /// North-south load balancer of a gateway router. `None` until provisioned.
    async fn gateway_load_balancer(
        &self,
        gateway: &str,
        protocol: Protocol,
    ) -> Result<Option<LoadBalancerRef>>;

    /// Physical IP of a gateway router. `None` until provisioned.
    async fn gateway_physical_ip(&self, gateway: &str) -> Result<Option<String>>;

    /// Load balancer of the default gateway, if one is configured
    async fn default_gateway_load_balancer(&self, protocol: Protocol) -> Option<LoadBalancerRef>;

    /// Upsert the VIP `vip:port` with `backends` listening on `target_port`
    async fn create_vip(
        &self,
        lb: &LoadBalancerRef,
        vip: &str,
        port: i32,
        backends: &[String],
        target_port: i32,
    ) -> Result<()>;

    /// Remove the VIP keyed by `vip:port`
    async fn remove_vip(&self, lb: &LoadBalancerRef, vip: &str, port: i32) -> Result<()>;
}

/// VIP key as stored in the load balancer: `ip:port`, IPv6 in brackets
pub fn vip_key(ip: &str, port: i32) -> String {
    if ip.contains(':') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vip_key() {
        assert_eq!(vip_key("10.96.0.5", 80), "10.96.0.5:80");
        assert_eq!(vip_key("fd00::5", 443), "[fd00::5]:443");
    }

    #[test]
    fn test_gateway_router_name() {
        assert_eq!(gateway_router_name("worker-1"), "GR_worker-1");
    }
}
