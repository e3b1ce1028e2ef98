//! Deferred exit events.
//!
//! Nothing is sent when a page goes away. Each pageview leaves a snapshot
//! behind; the next tracking cycle in any tab takes it and, once the candidate
//! has been idle for a full session timeout, re-emits it as that session's exit page.

use std::sync::Arc;
use std::time::Duration;

use footfall_core_types::elapsed_secs;
use footfall_storage::KvStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::PageEvent;
use crate::state::{keys, read_state, take_state, write_state};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCandidate {
    pub event: PageEvent,
    pub last_activity_at: i64,
    pub time_on_page: u64,
}

impl ExitCandidate {
    /// Idle for at least `timeout` since its last activity.
    pub fn is_expired_at(&self, now: i64, timeout: Duration) -> bool {
        elapsed_secs(self.last_activity_at, now) >= timeout.as_secs() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitState {
    NoCandidate,
    CandidateActive,
    CandidateExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    NoCandidate,
    Discarded,
    Promoted(Box<PageEvent>),
}

pub struct ExitCandidateManager {
    shared: Arc<dyn KvStore>,
    session_timeout: Duration,
}

impl ExitCandidateManager {
    pub fn new(shared: Arc<dyn KvStore>, session_timeout: Duration) -> Self {
        Self {
            shared,
            session_timeout,
        }
    }

    pub fn load(&self) -> Option<ExitCandidate> {
        read_state(self.shared.as_ref(), keys::EXIT_CANDIDATE)
    }

    /// Replaces whatever candidate exists with the pageview just emitted.
    pub fn snapshot(&self, event: &PageEvent, now: i64) {
        let candidate = ExitCandidate {
            event: event.clone(),
            last_activity_at: now,
            time_on_page: 0,
        };
        write_state(self.shared.as_ref(), keys::EXIT_CANDIDATE, &candidate, None);
    }

    /// Records dwell time on hide. Only touches a candidate owned by `session_id`.
    pub fn on_page_hide(&self, session_id: &str, now: i64, time_on_page: u64) -> bool {
        let Some(mut candidate) = self.load() else {
            return false;
        };
        if candidate.event.session_id != session_id {
            debug!(session = session_id, "exit candidate belongs to another session; leaving it");
            return false;
        }
        candidate.last_activity_at = now;
        candidate.time_on_page = time_on_page;
        write_state(self.shared.as_ref(), keys::EXIT_CANDIDATE, &candidate, None);
        true
    }

    pub fn state(&self, now: i64) -> ExitState {
        match self.load() {
            None => ExitState::NoCandidate,
            Some(candidate) if self.is_expired(&candidate, now) => ExitState::CandidateExpired,
            Some(_) => ExitState::CandidateActive,
        }
    }

    /// Takes the candidate. It becomes an exit event once it has been idle for
    /// the session timeout; otherwise it is dropped.
    pub fn promote(&self, now: i64) -> Promotion {
        let Some(candidate) = take_state::<ExitCandidate>(self.shared.as_ref(), keys::EXIT_CANDIDATE)
        else {
            return Promotion::NoCandidate;
        };
        if !self.is_expired(&candidate, now) {
            return Promotion::Discarded;
        }
        debug!(
            session = %candidate.event.session_id,
            page = %candidate.event.page_url,
            time_on_page = candidate.time_on_page,
            "promoting exit candidate"
        );
        Promotion::Promoted(Box::new(
            candidate
                .event
                .into_exit(candidate.last_activity_at, candidate.time_on_page),
        ))
    }

    fn is_expired(&self, candidate: &ExitCandidate, now: i64) -> bool {
        candidate.is_expired_at(now, self.session_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{sample_event, EventType};
    use footfall_core_types::ManualClock;
    use footfall_storage::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, ExitCandidateManager) {
        let shared = Arc::new(MemoryStore::new(Arc::new(ManualClock::at_unix(0))));
        let manager = ExitCandidateManager::new(shared.clone(), Duration::from_secs(120));
        (shared, manager)
    }

    #[test]
    fn lapsed_candidate_is_promoted_once() {
        let (_, exits) = manager();
        exits.snapshot(&sample_event("s1", "https://shop.test/a"), 0);
        assert_eq!(exits.state(200), ExitState::CandidateExpired);
        let Promotion::Promoted(exit) = exits.promote(200) else {
            panic!("expected promotion");
        };
        assert_eq!(exit.event_type, EventType::PageExit);
        assert_eq!(exit.timestamp, 1);
        assert_eq!(exits.promote(201), Promotion::NoCandidate);
        assert_eq!(exits.state(201), ExitState::NoCandidate);
    }

    #[test]
    fn recent_candidate_is_discarded() {
        let (_, exits) = manager();
        exits.snapshot(&sample_event("s1", "https://shop.test/a"), 0);
        assert_eq!(exits.state(10), ExitState::CandidateActive);
        assert_eq!(exits.promote(10), Promotion::Discarded);
        assert!(exits.load().is_none());
    }

    #[test]
    fn boundary_counts_as_expired() {
        let (_, exits) = manager();
        exits.snapshot(&sample_event("s1", "https://shop.test/a"), 0);
        assert_eq!(exits.state(119), ExitState::CandidateActive);
        assert!(matches!(exits.promote(120), Promotion::Promoted(_)));
    }

    #[test]
    fn candidate_fifty_seconds_old_is_discarded() {
        let (_, exits) = manager();
        exits.snapshot(&sample_event("s1", "https://shop.test/a"), 100);
        assert_eq!(exits.promote(150), Promotion::Discarded);
        assert_eq!(exits.state(150), ExitState::NoCandidate);
    }

    #[test]
    fn page_hide_updates_dwell_for_owning_session() {
        let (_, exits) = manager();
        exits.snapshot(&sample_event("s1", "https://shop.test/a"), 0);
        assert!(!exits.on_page_hide("s2", 30, 30));
        assert!(exits.on_page_hide("s1", 45, 45));
        let candidate = exits.load().unwrap();
        assert_eq!(candidate.last_activity_at, 45);
        assert_eq!(candidate.time_on_page, 45);
        let Promotion::Promoted(exit) = exits.promote(400) else {
            panic!("expected promotion");
        };
        assert_eq!(exit.timestamp, 46);
        assert_eq!(exit.time_on_page, 45);
    }

    #[test]
    fn malformed_candidate_is_dropped() {
        let (shared, exits) = manager();
        shared.set(keys::EXIT_CANDIDATE, "not json").unwrap();
        assert_eq!(exits.promote(500), Promotion::NoCandidate);
        assert!(shared.get(keys::EXIT_CANDIDATE).unwrap().is_none());
    }
}
