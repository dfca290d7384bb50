//! Kubernetes object accessors and Service helpers

use crate::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Service};

/// Read access to the Kubernetes objects the reconciler consumes
#[async_trait]
pub trait ClusterObjects: Send + Sync {
    /// Fetch a Service. `Ok(None)` when it does not exist.
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<Endpoints>>;
}

fn service_type(svc: &Service) -> &str {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .unwrap_or("ClusterIP")
}

/// Cluster IP of a service, if one has been allocated
pub fn cluster_ip(svc: &Service) -> Option<&str> {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        .filter(|ip| !ip.is_empty() && *ip != "None")
}

pub fn service_type_has_cluster_ip(svc: &Service) -> bool {
    matches!(service_type(svc), "ClusterIP" | "NodePort" | "LoadBalancer")
}

pub fn service_type_has_node_port(svc: &Service) -> bool {
    matches!(service_type(svc), "NodePort" | "LoadBalancer")
}

/// `namespace/name` of an object, for logging
pub fn object_key(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or("unknown")
    )
}
