use std::sync::Arc;
use std::time::Duration;

use footfall_core_types::{elapsed_secs, SessionId};
use footfall_storage::KvStore;
use footfall_url::{tracking_code, QueryMap, UtmParams};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::state::{clear, keys, read_state, write_raw, write_state};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub created_at: i64,
    pub last_activity_at: i64,
}

impl SessionRecord {
    pub fn new(now: i64) -> Self {
        Self {
            session_id: SessionId::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_live_at(&self, now: i64, timeout: Duration) -> bool {
        elapsed_secs(self.last_activity_at, now) < timeout.as_secs() as i64
    }
}

/// Attribution locked for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttribution {
    pub tracking_code: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_term: String,
    pub utm_content: String,
    pub is_direct: bool,
}

impl SessionAttribution {
    pub fn direct(tracking_code: String) -> Self {
        Self {
            tracking_code,
            utm_source: "(direct)".into(),
            utm_medium: "(none)".into(),
            is_direct: true,
            ..Self::default()
        }
    }

    /// Attribution for a landing page. Campaign values are only taken when
    /// campaign, source or medium is present.
    pub fn from_landing(query: &QueryMap, referrer: &str) -> Self {
        let utm = UtmParams::from_query(query);
        let tracking_code = tracking_code(referrer).unwrap_or_default();
        if !utm.is_campaign() {
            return Self::direct(tracking_code);
        }
        Self {
            tracking_code,
            utm_source: utm.source,
            utm_medium: utm.medium,
            utm_campaign: utm.campaign,
            utm_term: utm.term,
            utm_content: utm.content,
            is_direct: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AttributionLock {
    pub(crate) session_id: SessionId,
    #[serde(flatten)]
    pub(crate) attribution: SessionAttribution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResolution {
    pub session_id: SessionId,
    pub is_new_session: bool,
    pub created_at: i64,
    pub attribution: SessionAttribution,
}

pub struct SessionManager {
    shared: Arc<dyn KvStore>,
    cookies: Arc<dyn KvStore>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(shared: Arc<dyn KvStore>, cookies: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self {
            shared,
            cookies,
            timeout,
        }
    }

    /// The stored session if it is still live at `now`.
    pub fn current(&self, now: i64) -> Option<SessionRecord> {
        read_state::<SessionRecord>(self.shared.as_ref(), keys::SESSION)
            .filter(|record| record.is_live_at(now, self.timeout))
    }

    pub fn attribution(&self, session_id: &SessionId) -> Option<SessionAttribution> {
        read_state::<AttributionLock>(self.shared.as_ref(), keys::UTM_LOCK)
            .filter(|lock| &lock.session_id == session_id)
            .map(|lock| lock.attribution)
    }

    /// Continues the live session or starts a new one, refreshing its activity.
    pub fn resolve_session(&self, query: &QueryMap, referrer: &str, now: i64) -> SessionResolution {
        if let Some(mut record) = self.current(now) {
            let attribution = match self.attribution(&record.session_id) {
                Some(attribution) => attribution,
                None => {
                    debug!(session = %record.session_id, "attribution lock missing; locking as direct");
                    let attribution = SessionAttribution::direct(String::new());
                    self.lock_attribution(&record.session_id, &attribution);
                    attribution
                }
            };
            record.last_activity_at = now;
            self.persist(&record);
            return SessionResolution {
                session_id: record.session_id,
                is_new_session: false,
                created_at: record.created_at,
                attribution,
            };
        }

        clear(self.shared.as_ref(), keys::PAGE_SEQUENCE);
        clear(self.shared.as_ref(), keys::PAGE_FLOW);
        clear(self.shared.as_ref(), keys::UTM_LOCK);

        let record = SessionRecord::new(now);
        let attribution = SessionAttribution::from_landing(query, referrer);
        self.lock_attribution(&record.session_id, &attribution);
        self.persist(&record);
        info!(
            session = %record.session_id,
            direct = attribution.is_direct,
            source = %attribution.utm_source,
            "session started"
        );
        SessionResolution {
            session_id: record.session_id,
            is_new_session: true,
            created_at: record.created_at,
            attribution,
        }
    }

    fn lock_attribution(&self, session_id: &SessionId, attribution: &SessionAttribution) {
        let lock = AttributionLock {
            session_id: session_id.clone(),
            attribution: attribution.clone(),
        };
        write_state(self.shared.as_ref(), keys::UTM_LOCK, &lock, None);
    }

    fn persist(&self, record: &SessionRecord) {
        write_state(self.shared.as_ref(), keys::SESSION, record, None);
        write_raw(
            self.cookies.as_ref(),
            keys::SESSION_COOKIE,
            record.session_id.as_str(),
            Some(self.timeout),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;
    use footfall_storage::MemoryStore;
    use footfall_url::query_pairs;
    use pretty_assertions::assert_eq;

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        let clock = Arc::new(ManualClock::at_unix(0));
        let shared = Arc::new(MemoryStore::new(clock.clone()));
        let cookies = Arc::new(MemoryStore::new(clock));
        let manager = SessionManager::new(shared.clone(), cookies, Duration::from_secs(120));
        (shared, manager)
    }

    #[test]
    fn campaign_landing_locks_utm() {
        let (_, sessions) = manager();
        let query = query_pairs("https://shop.test/?utm_source=google&utm_medium=cpc&utm_term=shoes");
        let first = sessions.resolve_session(&query, "", 0);
        assert!(first.is_new_session);
        assert_eq!(first.attribution.utm_source, "google");
        assert_eq!(first.attribution.utm_term, "shoes");

        let later = query_pairs("https://shop.test/?utm_source=facebook");
        let second = sessions.resolve_session(&later, "", 10);
        assert!(!second.is_new_session);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.attribution, first.attribution);
    }

    #[test]
    fn term_only_landing_is_direct() {
        let (_, sessions) = manager();
        let query = query_pairs("https://shop.test/?utm_term=x");
        let resolved = sessions.resolve_session(&query, "https://go.shop.test/t/SPRING", 0);
        assert_eq!(
            resolved.attribution,
            SessionAttribution {
                tracking_code: "SPRING".into(),
                utm_source: "(direct)".into(),
                utm_medium: "(none)".into(),
                is_direct: true,
                ..SessionAttribution::default()
            }
        );
    }

    #[test]
    fn boundary_is_strict() {
        let (_, sessions) = manager();
        let first = sessions.resolve_session(&QueryMap::new(), "", 0);
        let kept = sessions.resolve_session(&QueryMap::new(), "", 119);
        assert_eq!(kept.session_id, first.session_id);
        let renewed = sessions.resolve_session(&QueryMap::new(), "", 239);
        assert!(renewed.is_new_session);
        assert_ne!(renewed.session_id, first.session_id);
    }

    #[test]
    fn new_session_clears_scoped_state() {
        let (shared, sessions) = manager();
        sessions.resolve_session(&QueryMap::new(), "", 0);
        shared.set(keys::PAGE_SEQUENCE, "{}").unwrap();
        shared.set(keys::PAGE_FLOW, "{}").unwrap();
        sessions.resolve_session(&QueryMap::new(), "", 500);
        assert!(shared.get(keys::PAGE_SEQUENCE).unwrap().is_none());
        assert!(shared.get(keys::PAGE_FLOW).unwrap().is_none());
    }

    #[test]
    fn missing_lock_never_takes_mid_session_campaign() {
        let (shared, sessions) = manager();
        let first = sessions.resolve_session(&QueryMap::new(), "", 0);
        shared.remove(keys::UTM_LOCK).unwrap();
        let query = query_pairs("https://shop.test/?utm_campaign=late&utm_source=mail");
        let resolved = sessions.resolve_session(&query, "https://go.shop.test/t/LATE1", 5);
        assert_eq!(resolved.session_id, first.session_id);
        assert_eq!(resolved.attribution, SessionAttribution::direct(String::new()));

        let again = sessions.resolve_session(&query, "", 10);
        assert_eq!(again.attribution.utm_campaign, "");
        assert_eq!(
            sessions.attribution(&first.session_id),
            Some(SessionAttribution::direct(String::new()))
        );
    }
}
