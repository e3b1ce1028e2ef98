use std::sync::Arc;
use std::time::Duration;

use footfall_core_types::{elapsed_secs, VisitorId};
use footfall_storage::KvStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::{keys, read_raw, write_raw};

/// Durable per-browser identity as it sits in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub visitor_id: VisitorId,
    pub visit_count: u32,
    pub first_visit_at: Option<i64>,
    pub last_visit_at: Option<i64>,
    pub last_activity_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorResolution {
    pub visitor_id: VisitorId,
    pub visit_count: u32,
    pub is_new_visitor: bool,
}

pub struct IdentityStore {
    durable: Arc<dyn KvStore>,
    visit_timeout: Duration,
    retention: Duration,
}

impl IdentityStore {
    pub fn new(durable: Arc<dyn KvStore>, visit_timeout: Duration, retention: Duration) -> Self {
        Self {
            durable,
            visit_timeout,
            retention,
        }
    }

    pub fn load(&self) -> Option<VisitorIdentity> {
        let visitor_id = self.visitor_id()?;
        Some(VisitorIdentity {
            visitor_id,
            visit_count: self.number(keys::VISIT_COUNT).unwrap_or(1).max(1) as u32,
            first_visit_at: self.number(keys::FIRST_VISIT),
            last_visit_at: self.number(keys::LAST_VISIT),
            last_activity_at: self.number(keys::LAST_ACTIVITY),
        })
    }

    /// Returns the visitor for this page load, minting one on first contact.
    /// A gap longer than the visit timeout since the last activity starts a new visit.
    pub fn resolve_visitor(&self, now: i64) -> VisitorResolution {
        let Some(visitor_id) = self.visitor_id() else {
            let visitor_id = VisitorId::new();
            self.put(keys::VISITOR_ID, visitor_id.as_str());
            self.put(keys::VISIT_COUNT, "1");
            self.put(keys::FIRST_VISIT, &now.to_string());
            self.put(keys::LAST_VISIT, &now.to_string());
            self.put(keys::LAST_ACTIVITY, &now.to_string());
            debug!(visitor = %visitor_id, "minted visitor id");
            return VisitorResolution {
                visitor_id,
                visit_count: 1,
                is_new_visitor: true,
            };
        };

        let mut visit_count = self
            .number(keys::VISIT_COUNT)
            .map(|count| count.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1);
        let new_visit = match self.number(keys::LAST_ACTIVITY) {
            Some(last) => elapsed_secs(last, now) > self.visit_timeout.as_secs() as i64,
            None => true,
        };
        if new_visit {
            visit_count = visit_count.saturating_add(1);
            self.put(keys::VISIT_COUNT, &visit_count.to_string());
            self.put(keys::LAST_VISIT, &now.to_string());
            debug!(visitor = %visitor_id, visit_count, "new visit");
        }
        // Rewriting the id extends its retention window.
        self.put(keys::VISITOR_ID, visitor_id.as_str());
        self.put(keys::LAST_ACTIVITY, &now.to_string());

        VisitorResolution {
            visitor_id,
            visit_count,
            is_new_visitor: false,
        }
    }

    fn visitor_id(&self) -> Option<VisitorId> {
        read_raw(self.durable.as_ref(), keys::VISITOR_ID)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(VisitorId)
    }

    fn number(&self, key: &str) -> Option<i64> {
        let raw = read_raw(self.durable.as_ref(), key)?;
        match raw.trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, "discarding malformed visitor field");
                crate::state::clear(self.durable.as_ref(), key);
                None
            }
        }
    }

    fn put(&self, key: &str, value: &str) {
        write_raw(self.durable.as_ref(), key, value, Some(self.retention));
    }
}
