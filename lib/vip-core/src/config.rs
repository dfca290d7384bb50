//! Controller configuration loaded from the environment

use crate::{CoreError, Result};
use std::time::Duration;

/// Longest accepted gateway readiness timeout (one day)
pub const MAX_GATEWAY_READY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Gateway readiness polling settings
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayPollConfig {
    /// Interval between readiness probes
    pub interval: Duration,
    /// Ceiling after which a node's backfill is abandoned
    pub timeout: Duration,
}

impl Default for GatewayPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Program NodePort VIPs on gateway load balancers
    pub nodeport_enable: bool,
    pub gateway_poll: GatewayPollConfig,
    /// Path of the `ovn-nbctl` binary
    pub nbctl_path: String,
    /// Upper bound for a single `ovn-nbctl` invocation
    pub nbctl_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            nodeport_enable: false,
            gateway_poll: GatewayPollConfig::default(),
            nbctl_path: "ovn-nbctl".to_string(),
            nbctl_timeout: Duration::from_secs(15),
        }
    }
}

impl ControllerConfig {
    /// Load the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("OVN_NODEPORT_ENABLE") {
            config.nodeport_enable = parse_bool("OVN_NODEPORT_ENABLE", &value)?;
        }
        if let Some(value) = lookup("OVN_GATEWAY_POLL_INTERVAL_MS") {
            config.gateway_poll.interval =
                Duration::from_millis(parse_u64("OVN_GATEWAY_POLL_INTERVAL_MS", &value)?);
        }
        if let Some(value) = lookup("OVN_GATEWAY_READY_TIMEOUT_SECS") {
            config.gateway_poll.timeout =
                Duration::from_secs(parse_u64("OVN_GATEWAY_READY_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("OVN_NBCTL") {
            if !value.trim().is_empty() {
                config.nbctl_path = value.trim().to_string();
            }
        }
        if let Some(value) = lookup("OVN_NBCTL_TIMEOUT_SECS") {
            config.nbctl_timeout =
                Duration::from_secs(parse_u64("OVN_NBCTL_TIMEOUT_SECS", &value)?);
        }

        if config.gateway_poll.interval.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "OVN_GATEWAY_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if config.gateway_poll.timeout > MAX_GATEWAY_READY_TIMEOUT {
            return Err(CoreError::InvalidConfiguration(format!(
                "OVN_GATEWAY_READY_TIMEOUT_SECS must not exceed {}",
                MAX_GATEWAY_READY_TIMEOUT.as_secs()
            )));
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(CoreError::InvalidConfiguration(format!(
            "{}: expected a boolean, got {:?}",
            key, other
        ))),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        CoreError::InvalidConfiguration(format!("{}: {:?} is not a number ({})", key, value, e))
    })
}
