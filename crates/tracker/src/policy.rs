use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerPolicyView {
    /// When false, hosts outside both lists are tracked against production.
    pub enforce_domain: bool,
    pub allowed_domains: Vec<String>,
    pub internal_domains: Vec<String>,
    pub production_endpoint: String,
    pub internal_endpoint: String,
    pub visit_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub debounce_ms: u64,
    pub settle_delay_ms: u64,
    pub durable_retention_days: u64,
}

impl Default for TrackerPolicyView {
    fn default() -> Self {
        Self {
            enforce_domain: true,
            allowed_domains: vec!["storefront.example.com".into()],
            internal_domains: vec![
                "localhost".into(),
                "127.0.0.1".into(),
                "staging.storefront.example.com".into(),
            ],
            production_endpoint: "https://collect.storefront.example.com/v1/events".into(),
            internal_endpoint: "https://collect-staging.storefront.example.com/v1/events".into(),
            visit_timeout_secs: 30,
            session_timeout_secs: 120,
            debounce_ms: 500,
            settle_delay_ms: 100,
            durable_retention_days: 730,
        }
    }
}

impl TrackerPolicyView {
    pub fn visit_timeout(&self) -> Duration {
        Duration::from_secs(self.visit_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn durable_retention(&self) -> Duration {
        Duration::from_secs(self.durable_retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
