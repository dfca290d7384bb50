//! Outcomes of the VIP operations issued during one reconciliation

use crate::LoadBalancerRef;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VipAction {
    Create,
    Remove,
}

impl fmt::Display for VipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VipAction::Create => f.write_str("create"),
            VipAction::Remove => f.write_str("remove"),
        }
    }
}

/// One attempted VIP mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VipOutcome {
    pub action: VipAction,
    pub load_balancer: LoadBalancerRef,
    pub vip: String,
    pub error: Option<String>,
}

impl VipOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Accumulated results of a best-effort pass.
///
/// Failures never abort the pass; they are collected here alongside the
/// lookups that had to be skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<VipOutcome>,
    pub skipped: Vec<String>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        action: VipAction,
        load_balancer: &LoadBalancerRef,
        vip: String,
        error: Option<String>,
    ) {
        self.outcomes.push(VipOutcome {
            action,
            load_balancer: load_balancer.clone(),
            vip,
            error,
        });
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skipped.push(reason.into());
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.outcomes.extend(other.outcomes);
        self.skipped.extend(other.skipped);
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True when every operation succeeded and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.skipped.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.failed(),
            self.skipped.len()
        )
    }
}
