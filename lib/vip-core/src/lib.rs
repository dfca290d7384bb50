//! Core VIP reconciliation for Kubernetes services
//!
//! This library provides:
//! - Protocol-partitioned backend tables built from Endpoints
//! - Cluster, NodePort and external-IP VIP synchronization
//! - Gateway readiness polling and NodePort backfill for joining nodes
//! - Cluster VIP teardown for deleted Endpoints

pub mod backend;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod objects;
pub mod reconciler;
pub mod report;
pub mod teardown;
pub mod wait;

#[cfg(test)]
mod testing;

pub use backend::{BackendTable, PortBackends, Protocol};
pub use config::{ControllerConfig, GatewayPollConfig};
pub use control::{gateway_router_name, vip_key, LoadBalancerControl, LoadBalancerRef};
pub use error::{CoreError, Result};
pub use gateway::GatewayState;
pub use objects::ClusterObjects;
pub use reconciler::VipReconciler;
pub use report::{SyncReport, VipAction, VipOutcome};
pub use wait::{poll_until, PollOutcome};
