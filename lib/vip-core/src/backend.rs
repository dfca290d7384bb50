//! Protocol-partitioned backend tables built from Endpoints subsets

use k8s_openapi::api::core::v1::Endpoints;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Transport protocol of a load-balancer VIP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    /// Parse a Kubernetes `protocol` field. An unset field is the API server
    /// default (TCP); SCTP and anything else has no load balancer here.
    pub fn from_k8s(protocol: Option<&str>) -> Option<Self> {
        match protocol {
            None | Some("TCP") => Some(Protocol::Tcp),
            Some("UDP") => Some(Protocol::Udp),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }

    fn index(self) -> usize {
        match self {
            Protocol::Tcp => 0,
            Protocol::Udp => 1,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend addresses behind one named port
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortBackends {
    /// Backend IPs in subset order. Duplicates are kept.
    pub backends: Vec<String>,
    /// Container port the backends listen on
    pub target_port: i32,
}

/// Per-protocol mapping from port name to its backends
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendTable {
    ports: [HashMap<String, PortBackends>; 2],
}

impl BackendTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from every ready address of every subset.
    ///
    /// Each address is paired with every port of its subset. When the same
    /// port name shows up with different target ports, the last one wins.
    pub fn from_endpoints(ep: &Endpoints) -> Self {
        let mut table = Self::new();

        for subset in ep.subsets.iter().flatten() {
            let ports = subset.ports.as_deref().unwrap_or_default();
            for address in subset.addresses.iter().flatten() {
                for port in ports {
                    let Some(protocol) = Protocol::from_k8s(port.protocol.as_deref()) else {
                        continue;
                    };
                    table.insert(
                        protocol,
                        port.name.as_deref().unwrap_or_default(),
                        &address.ip,
                        port.port,
                    );
                }
            }
        }

        debug!(
            "Tcp table: {:?} Udp table: {:?}",
            table.ports(Protocol::Tcp),
            table.ports(Protocol::Udp)
        );
        table
    }

    /// Append a backend to a port, overwriting its target port
    pub fn insert(&mut self, protocol: Protocol, port_name: &str, ip: &str, target_port: i32) {
        let entry = self.ports[protocol.index()]
            .entry(port_name.to_string())
            .or_default();

        if !entry.backends.is_empty() && entry.target_port != target_port {
            warn!(
                protocol = %protocol,
                port = port_name,
                previous = entry.target_port,
                current = target_port,
                "Conflicting target ports for the same port name, keeping the last one"
            );
        }

        entry.backends.push(ip.to_string());
        entry.target_port = target_port;
    }

    /// All named ports for a protocol
    pub fn ports(&self, protocol: Protocol) -> &HashMap<String, PortBackends> {
        &self.ports[protocol.index()]
    }

    pub fn get(&self, protocol: Protocol, port_name: &str) -> Option<&PortBackends> {
        self.ports[protocol.index()].get(port_name)
    }

    pub fn is_empty(&self) -> bool {
        self.ports.iter().all(HashMap::is_empty)
    }
}
