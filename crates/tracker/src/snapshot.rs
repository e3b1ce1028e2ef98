//! Read-only view of persisted tracker state.
//!
//! Unlike the tracker's own reads, nothing here repairs storage: malformed
//! entries are reported and left where they are.

use footfall_core_types::VisitorId;
use footfall_storage::{load_json, KvStore, StorageError, StoreSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::exit::{ExitCandidate, ExitState};
use crate::identity::VisitorIdentity;
use crate::policy::TrackerPolicyView;
use crate::sequence::{PageFlowState, PageSequenceState};
use crate::session::{AttributionLock, SessionAttribution, SessionRecord};
use crate::state::keys;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub evaluated_at: i64,
    pub visitor: Option<VisitorIdentity>,
    pub session: Option<SessionRecord>,
    pub session_live: bool,
    pub attribution: Option<SessionAttribution>,
    pub sequence: Option<PageSequenceState>,
    pub flow: Option<PageFlowState>,
    pub exit_state: ExitState,
    pub exit_candidate: Option<ExitCandidate>,
    /// Keys whose stored value could not be decoded.
    pub malformed: Vec<String>,
}

impl StateSnapshot {
    /// Reads every tracker entry as of `now`. Unreadable entries read as absent.
    pub fn read(stores: &StoreSet, policy: &TrackerPolicyView, now: i64) -> Self {
        let mut reader = Reader::default();
        let shared = stores.shared.as_ref();

        let visitor = reader.visitor(stores.durable.as_ref());
        let session: Option<SessionRecord> = reader.json(shared, keys::SESSION);
        let lock: Option<AttributionLock> = reader.json(shared, keys::UTM_LOCK);
        let sequence = reader.json(shared, keys::PAGE_SEQUENCE);
        let flow = reader.json(shared, keys::PAGE_FLOW);
        let exit_candidate: Option<ExitCandidate> = reader.json(shared, keys::EXIT_CANDIDATE);

        let session_live = session
            .as_ref()
            .map(|record| record.is_live_at(now, policy.session_timeout()))
            .unwrap_or(false);
        let attribution = match (&session, lock) {
            (Some(record), Some(lock)) if lock.session_id == record.session_id => {
                Some(lock.attribution)
            }
            _ => None,
        };
        let exit_state = match &exit_candidate {
            None => ExitState::NoCandidate,
            Some(candidate) if candidate.is_expired_at(now, policy.session_timeout()) => {
                ExitState::CandidateExpired
            }
            Some(_) => ExitState::CandidateActive,
        };

        Self {
            evaluated_at: now,
            visitor,
            session,
            session_live,
            attribution,
            sequence,
            flow,
            exit_state,
            exit_candidate,
            malformed: reader.malformed,
        }
    }
}

#[derive(Default)]
struct Reader {
    malformed: Vec<String>,
}

impl Reader {
    fn json<T: DeserializeOwned>(&mut self, store: &dyn KvStore, key: &str) -> Option<T> {
        match load_json(store, key) {
            Ok(value) => value,
            Err(StorageError::Malformed { .. }) => {
                self.malformed.push(key.to_string());
                None
            }
            Err(err) => {
                debug!(key, %err, "state unreadable");
                None
            }
        }
    }

    fn raw(&mut self, store: &dyn KvStore, key: &str) -> Option<String> {
        match store.get(key) {
            Ok(value) => value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty()),
            Err(err) => {
                debug!(key, %err, "state unreadable");
                None
            }
        }
    }

    fn number(&mut self, store: &dyn KvStore, key: &str) -> Option<i64> {
        let raw = self.raw(store, key)?;
        match raw.parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.malformed.push(key.to_string());
                None
            }
        }
    }

    fn visitor(&mut self, durable: &dyn KvStore) -> Option<VisitorIdentity> {
        let visitor_id = VisitorId(self.raw(durable, keys::VISITOR_ID)?);
        let visit_count = self
            .number(durable, keys::VISIT_COUNT)
            .map(|count| count.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1);
        Some(VisitorIdentity {
            visitor_id,
            visit_count,
            first_visit_at: self.number(durable, keys::FIRST_VISIT),
            last_visit_at: self.number(durable, keys::LAST_VISIT),
            last_activity_at: self.number(durable, keys::LAST_ACTIVITY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_event;
    use crate::session::SessionManager;
    use footfall_core_types::ManualClock;
    use footfall_url::QueryMap;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn stores() -> StoreSet {
        StoreSet::in_memory(Arc::new(ManualClock::at_unix(0)))
    }

    #[test]
    fn empty_stores_read_as_nothing() {
        let snapshot = StateSnapshot::read(&stores(), &TrackerPolicyView::default(), 10);
        assert_eq!(snapshot.visitor, None);
        assert!(!snapshot.session_live);
        assert_eq!(snapshot.exit_state, ExitState::NoCandidate);
        assert!(snapshot.malformed.is_empty());
    }

    #[test]
    fn live_session_and_its_attribution_are_reported() {
        let stores = stores();
        let policy = TrackerPolicyView::default();
        let sessions =
            SessionManager::new(stores.shared.clone(), stores.cookies.clone(), policy.session_timeout());
        let resolved = sessions.resolve_session(&QueryMap::new(), "", 100);
        let candidate = ExitCandidate {
            event: sample_event(resolved.session_id.as_str(), "https://shop.test/a"),
            last_activity_at: 100,
            time_on_page: 0,
        };
        stores
            .shared
            .set(keys::EXIT_CANDIDATE, &serde_json::to_string(&candidate).unwrap())
            .unwrap();

        let live = StateSnapshot::read(&stores, &policy, 150);
        assert!(live.session_live);
        assert_eq!(live.attribution, Some(SessionAttribution::direct(String::new())));
        assert_eq!(live.exit_state, ExitState::CandidateActive);

        let later = StateSnapshot::read(&stores, &policy, 220);
        assert!(!later.session_live);
        assert_eq!(later.exit_state, ExitState::CandidateExpired);
    }

    #[test]
    fn malformed_entries_are_reported_and_left_in_place() {
        let stores = stores();
        stores.durable.set(keys::VISITOR_ID, "v-1").unwrap();
        stores.durable.set(keys::VISIT_COUNT, "many").unwrap();
        stores.shared.set(keys::SESSION, "{broken").unwrap();

        let snapshot = StateSnapshot::read(&stores, &TrackerPolicyView::default(), 10);
        let visitor = snapshot.visitor.unwrap();
        assert_eq!(visitor.visitor_id.as_str(), "v-1");
        assert_eq!(visitor.visit_count, 1);
        assert_eq!(snapshot.session, None);
        assert_eq!(
            snapshot.malformed,
            vec![keys::VISIT_COUNT.to_string(), keys::SESSION.to_string()]
        );
        assert_eq!(stores.durable.get(keys::VISIT_COUNT).unwrap().as_deref(), Some("many"));
        assert_eq!(stores.shared.get(keys::SESSION).unwrap().as_deref(), Some("{broken"));
    }
}
