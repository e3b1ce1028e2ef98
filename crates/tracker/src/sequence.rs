use std::sync::Arc;

use footfall_core_types::SessionId;
use footfall_storage::KvStore;
use serde::{Deserialize, Serialize};

use crate::state::{keys, read_state, write_state};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSequenceState {
    pub session_id: SessionId,
    pub page_sequence: u32,
    pub last_update: i64,
}

pub struct PageSequenceTracker {
    shared: Arc<dyn KvStore>,
}

impl PageSequenceTracker {
    pub fn new(shared: Arc<dyn KvStore>) -> Self {
        Self { shared }
    }

    pub fn load(&self) -> Option<PageSequenceState> {
        read_state(self.shared.as_ref(), keys::PAGE_SEQUENCE)
    }

    /// Position of the next pageview within `session_id`; 1 marks the landing page.
    pub fn next_sequence(&self, session_id: &SessionId, now: i64) -> u32 {
        let page_sequence = match self.load() {
            Some(state) if &state.session_id == session_id => state.page_sequence.saturating_add(1),
            _ => 1,
        };
        let state = PageSequenceState {
            session_id: session_id.clone(),
            page_sequence,
            last_update: now,
        };
        write_state(self.shared.as_ref(), keys::PAGE_SEQUENCE, &state, None);
        page_sequence
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFlowState {
    pub session_id: SessionId,
    pub last_page_url: String,
    pub session_page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    pub previous_page_url: String,
    pub session_page_count: u32,
}

pub struct PageFlow {
    shared: Arc<dyn KvStore>,
}

impl PageFlow {
    pub fn new(shared: Arc<dyn KvStore>) -> Self {
        Self { shared }
    }

    pub fn load(&self) -> Option<PageFlowState> {
        read_state(self.shared.as_ref(), keys::PAGE_FLOW)
    }

    pub fn previous(&self, session_id: &SessionId) -> FlowStep {
        match self.load() {
            Some(state) if &state.session_id == session_id => FlowStep {
                previous_page_url: state.last_page_url,
                session_page_count: state.session_page_count.saturating_add(1),
            },
            _ => FlowStep {
                previous_page_url: String::new(),
                session_page_count: 1,
            },
        }
    }

    /// Called once the event for `page_url` has been handed to the emitter.
    pub fn record(&self, session_id: &SessionId, page_url: &str, session_page_count: u32) {
        let state = PageFlowState {
            session_id: session_id.clone(),
            last_page_url: page_url.to_string(),
            session_page_count,
        };
        write_state(self.shared.as_ref(), keys::PAGE_FLOW, &state, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;
    use footfall_storage::MemoryStore;

    fn shared() -> Arc<dyn KvStore> {
        Arc::new(MemoryStore::new(Arc::new(ManualClock::at_unix(0))))
    }

    #[test]
    fn sequence_counts_within_session_and_resets_across() {
        let store = shared();
        let sequence = PageSequenceTracker::new(store);
        let s1 = SessionId("s1".into());
        let s2 = SessionId("s2".into());
        assert_eq!(sequence.next_sequence(&s1, 0), 1);
        assert_eq!(sequence.next_sequence(&s1, 5), 2);
        assert_eq!(sequence.next_sequence(&s1, 9), 3);
        assert_eq!(sequence.next_sequence(&s2, 300), 1);
        assert_eq!(sequence.load().unwrap().last_update, 300);
    }

    #[test]
    fn flow_reports_previous_url_for_same_session_only() {
        let flow = PageFlow::new(shared());
        let s1 = SessionId("s1".into());
        let first = flow.previous(&s1);
        assert_eq!(first.previous_page_url, "");
        assert_eq!(first.session_page_count, 1);

        flow.record(&s1, "https://shop.test/a", first.session_page_count);
        let second = flow.previous(&s1);
        assert_eq!(second.previous_page_url, "https://shop.test/a");
        assert_eq!(second.session_page_count, 2);

        let other = flow.previous(&SessionId("s2".into()));
        assert_eq!(other.previous_page_url, "");
        assert_eq!(other.session_page_count, 1);
    }
}
