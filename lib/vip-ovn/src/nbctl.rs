//! OVN northbound load-balancer control through `ovn-nbctl`

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vip_core::{
    vip_key, ControllerConfig, CoreError, LoadBalancerControl, LoadBalancerRef, Protocol, Result,
};

/// NbctlClient drives the OVN northbound database with `ovn-nbctl`.
///
/// Cluster and default-gateway load balancers never change once created, so
/// their lookups are cached per protocol.
pub struct NbctlClient {
    binary: String,
    timeout: Duration,
    cluster_lbs: RwLock<HashMap<Protocol, LoadBalancerRef>>,
    default_gateway_lbs: RwLock<HashMap<Protocol, LoadBalancerRef>>,
}

impl NbctlClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            cluster_lbs: RwLock::new(HashMap::new()),
            default_gateway_lbs: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.nbctl_path.clone(), config.nbctl_timeout)
    }

    /// Run `ovn-nbctl` and return its trimmed stdout
    async fn run(&self, args: &[String]) -> Result<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running {}", command);

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| CoreError::Timeout(command.clone()))?
        .map_err(|e| CoreError::Command {
            command: command.clone(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(CoreError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn find_one(&self, args: Vec<String>) -> Result<Option<String>> {
        let out = self.run(&args).await?;
        Ok(bare_lines(&out).into_iter().next())
    }
}

#[async_trait]
impl LoadBalancerControl for NbctlClient {
    async fn load_balancer(&self, protocol: Protocol) -> Result<LoadBalancerRef> {
        if let Some(lb) = self.cluster_lbs.read().await.get(&protocol) {
            return Ok(lb.clone());
        }

        let lb = self
            .find_one(cluster_lb_args(protocol))
            .await?
            .map(LoadBalancerRef::new)
            .ok_or_else(|| CoreError::LoadBalancerNotFound(format!("cluster {}", protocol)))?;

        self.cluster_lbs.write().await.insert(protocol, lb.clone());
        Ok(lb)
    }

    async fn gateway_routers(&self) -> Result<Vec<String>> {
        let out = self.run(&gateway_routers_args()).await?;
        Ok(bare_lines(&out))
    }

    async fn gateway_load_balancer(
        &self,
        gateway: &str,
        protocol: Protocol,
    ) -> Result<Option<LoadBalancerRef>> {
        Ok(self
            .find_one(gateway_lb_args(gateway, protocol))
            .await?
            .map(LoadBalancerRef::new))
    }

    async fn gateway_physical_ip(&self, gateway: &str) -> Result<Option<String>> {
        let out = self.run(&physical_ip_args(gateway)).await?;
        let ip = unquote(&out);
        Ok((!ip.is_empty()).then(|| ip.to_string()))
    }

    async fn default_gateway_load_balancer(&self, protocol: Protocol) -> Option<LoadBalancerRef> {
        if let Some(lb) = self.default_gateway_lbs.read().await.get(&protocol) {
            return Some(lb.clone());
        }

        let routers = match self.run(&default_gateway_args()).await {
            Ok(out) => bare_lines(&out),
            Err(e) => {
                warn!("Failed to look up the default gateway: {}", e);
                return None;
            }
        };
        let gateway = routers.into_iter().min()?;

        match self.gateway_load_balancer(&gateway, protocol).await {
            Ok(Some(lb)) => {
                self.default_gateway_lbs
                    .write()
                    .await
                    .insert(protocol, lb.clone());
                Some(lb)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to get {} load balancer of {}: {}", protocol, gateway, e);
                None
            }
        }
    }

    async fn create_vip(
        &self,
        lb: &LoadBalancerRef,
        vip: &str,
        port: i32,
        backends: &[String],
        target_port: i32,
    ) -> Result<()> {
        if backends.is_empty() {
            return self.remove_vip(lb, vip, port).await;
        }
        self.run(&create_vip_args(lb, vip, port, backends, target_port))
            .await
            .map(|_| ())
    }

    async fn remove_vip(&self, lb: &LoadBalancerRef, vip: &str, port: i32) -> Result<()> {
        self.run(&remove_vip_args(lb, vip, port)).await.map(|_| ())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn find_args(columns: &str, table: &str, condition: &str) -> Vec<String> {
    let columns = format!("--columns={}", columns);
    args([
        "--data=bare",
        "--no-heading",
        columns.as_str(),
        "find",
        table,
        condition,
    ])
}

fn cluster_lb_args(protocol: Protocol) -> Vec<String> {
    let condition = format!(
        "external_ids:k8s-cluster-lb-{}=yes",
        protocol.as_str().to_lowercase()
    );
    find_args("_uuid", "load_balancer", &condition)
}

fn gateway_lb_args(gateway: &str, protocol: Protocol) -> Vec<String> {
    let condition = format!("external_ids:{}_lb_gateway_router={}", protocol, gateway);
    find_args("_uuid", "load_balancer", &condition)
}

fn gateway_routers_args() -> Vec<String> {
    find_args("name", "logical_router", "options:chassis!=null")
}

fn default_gateway_args() -> Vec<String> {
    find_args("name", "logical_router", "options:lb_force_snat_ip!=-")
}

fn physical_ip_args(gateway: &str) -> Vec<String> {
    args([
        "--if-exists",
        "get",
        "logical_router",
        gateway,
        "external_ids:physical_ip",
    ])
}

fn create_vip_args(
    lb: &LoadBalancerRef,
    vip: &str,
    port: i32,
    backends: &[String],
    target_port: i32,
) -> Vec<String> {
    let targets = backends
        .iter()
        .map(|ip| vip_key(ip, target_port))
        .collect::<Vec<_>>()
        .join(",");
    let column = format!("vips:\"{}\"=\"{}\"", vip_key(vip, port), targets);
    args(["set", "load_balancer", lb.as_str(), column.as_str()])
}

fn remove_vip_args(lb: &LoadBalancerRef, vip: &str, port: i32) -> Vec<String> {
    let key = format!("\"{}\"", vip_key(vip, port));
    args(["remove", "load_balancer", lb.as_str(), "vips", key.as_str()])
}

/// Non-empty lines of `--data=bare` output
fn bare_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}
