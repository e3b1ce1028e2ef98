use footfall_url::{host_of, matches_any};
use serde::{Deserialize, Serialize};

use crate::errors::{TrackError, TrackResult};
use crate::policy::TrackerPolicyView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Production,
    Internal,
}

/// Decides once per page load whether tracking runs and where events go.
#[derive(Debug, Clone)]
pub struct DomainGate {
    enforce: bool,
    allowed: Vec<String>,
    internal: Vec<String>,
}

impl DomainGate {
    pub fn from_policy(policy: &TrackerPolicyView) -> Self {
        Self {
            enforce: policy.enforce_domain,
            allowed: policy.allowed_domains.clone(),
            internal: policy.internal_domains.clone(),
        }
    }

    /// Internal hosts win over allowed ones so staging mirrors never report to production.
    pub fn check(&self, page_url: &str) -> TrackResult<GateDecision> {
        let host = host_of(page_url).unwrap_or_default();
        if !host.is_empty() && matches_any(&host, &self.internal) {
            return Ok(GateDecision::Internal);
        }
        if !self.enforce || (!host.is_empty() && matches_any(&host, &self.allowed)) {
            return Ok(GateDecision::Production);
        }
        Err(TrackError::UnauthorizedDomain { host })
    }
}
