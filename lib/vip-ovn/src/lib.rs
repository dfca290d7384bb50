//! Kubernetes and OVN northbound backends for the VIP reconciler
pub mod client;
pub mod nbctl;

pub use client::KubeObjects;
pub use nbctl::NbctlClient;
