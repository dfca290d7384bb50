//! Kubernetes client for the objects the reconciler reads

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Service};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;
use vip_core::{ClusterObjects, Result};

/// KubeObjects wraps the Kubernetes client for Service and Endpoints lookups
pub struct KubeObjects {
    client: Client,
}

impl KubeObjects {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterObjects for KubeObjects {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(services.get_opt(name).await?)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&ListParams::default()).await?;

        debug!("Discovered {} namespaces", list.items.len());
        Ok(list.items)
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<Endpoints>> {
        let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let list = endpoints.list(&ListParams::default()).await?;

        debug!("Discovered {} endpoints in {}", list.items.len(), namespace);
        Ok(list.items)
    }
}
