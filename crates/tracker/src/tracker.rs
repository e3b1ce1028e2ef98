use std::sync::Arc;

use footfall_core_types::{Clock, SessionId};
use footfall_storage::StoreSet;
use footfall_transport::{Beacon, Delivery, Emitter};
use footfall_url::{canonicalize_url, page_path, query_pairs, referrer_domain};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::{DeviceContext, DeviceProfile};
use crate::errors::{TrackError, TrackResult};
use crate::exit::{ExitCandidateManager, Promotion};
use crate::gate::{DomainGate, GateDecision};
use crate::identity::{IdentityStore, VisitorResolution};
use crate::model::{flag, EventType, PageContext, PageEvent};
use crate::navigation::{NavigationEvent, NavigationObserver, PendingRoute};
use crate::policy::TrackerPolicyView;
use crate::sequence::{PageFlow, PageSequenceTracker};
use crate::session::{SessionAttribution, SessionManager};
use crate::state::{keys, read_state, write_state};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Same path as the last pageview of this tracker.
    SamePath,
    /// Same path tracked in this tab within the debounce window.
    Debounced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageview {
    pub event: PageEvent,
    pub delivery: Delivery,
    /// Exit event of the previous session, sent ahead of `event`.
    pub exit: Option<PageEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Sent(Box<Pageview>),
    Suppressed(SuppressReason),
    /// The domain gate refused this page load.
    Disabled,
    /// A route change is waiting for the settle delay.
    Scheduled { due_at_ms: i64 },
    /// Nothing to send.
    Idle,
}

impl TrackOutcome {
    pub fn pageview(&self) -> Option<&Pageview> {
        match self {
            TrackOutcome::Sent(pageview) => Some(pageview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Active { decision: GateDecision, endpoint: String },
    Disabled,
    Closed,
}

#[derive(Debug, Serialize, Deserialize)]
struct LastView {
    path: String,
    at_ms: i64,
}

/// Tracker bound to one page context (one tab, one document).
pub struct Tracker {
    stores: StoreSet,
    emitter: Emitter,
    clock: Arc<dyn Clock>,
    policy: TrackerPolicyView,
    profile: DeviceProfile,
    device: DeviceContext,
    gate: DomainGate,
    identity: IdentityStore,
    sessions: SessionManager,
    sequence: PageSequenceTracker,
    flow: PageFlow,
    exits: ExitCandidateManager,
    navigation: NavigationObserver,
    lifecycle: Lifecycle,
    visitor: Option<VisitorResolution>,
    session_id: Option<SessionId>,
    current_page: Option<PageContext>,
    last_tracked_path: Option<String>,
    page_started_at_ms: i64,
}

impl Tracker {
    pub fn new(
        stores: StoreSet,
        emitter: Emitter,
        clock: Arc<dyn Clock>,
        policy: TrackerPolicyView,
        device: DeviceContext,
    ) -> Self {
        let session_timeout = policy.session_timeout();
        Self {
            gate: DomainGate::from_policy(&policy),
            identity: IdentityStore::new(
                stores.durable.clone(),
                policy.visit_timeout(),
                policy.durable_retention(),
            ),
            sessions: SessionManager::new(stores.shared.clone(), stores.cookies.clone(), session_timeout),
            sequence: PageSequenceTracker::new(stores.shared.clone()),
            flow: PageFlow::new(stores.shared.clone()),
            exits: ExitCandidateManager::new(stores.shared.clone(), session_timeout),
            navigation: NavigationObserver::new(policy.settle_delay_ms),
            profile: device.profile(),
            page_started_at_ms: clock.unix_millis(),
            stores,
            emitter,
            clock,
            policy,
            device,
            lifecycle: Lifecycle::Created,
            visitor: None,
            session_id: None,
            current_page: None,
            last_tracked_path: None,
        }
    }

    pub fn policy(&self) -> &TrackerPolicyView {
        &self.policy
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    pub fn gate_decision(&self) -> Option<GateDecision> {
        match &self.lifecycle {
            Lifecycle::Active { decision, .. } => Some(*decision),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn next_navigation_due_ms(&self) -> Option<i64> {
        self.navigation.due_at()
    }

    /// Evaluates the domain gate and tracks the landing pageview. Runs once per instance.
    pub fn init(&mut self, page: &PageContext) -> TrackOutcome {
        if self.lifecycle != Lifecycle::Created {
            debug!("tracker already initialised");
            return TrackOutcome::Idle;
        }
        let decision = match self.gate.check(&page.url) {
            Ok(decision) => decision,
            Err(err) => {
                debug!(%err, "tracking disabled for this page");
                self.lifecycle = Lifecycle::Disabled;
                return TrackOutcome::Disabled;
            }
        };
        let endpoint = match decision {
            GateDecision::Production => self.policy.production_endpoint.clone(),
            GateDecision::Internal => self.policy.internal_endpoint.clone(),
        };
        info!(?decision, %endpoint, "tracker active");
        self.lifecycle = Lifecycle::Active { decision, endpoint };
        self.navigation.reset(&page.url);
        self.track_pageview(page)
    }

    pub fn track_pageview(&mut self, page: &PageContext) -> TrackOutcome {
        let endpoint = match &self.lifecycle {
            Lifecycle::Active { endpoint, .. } => endpoint.clone(),
            Lifecycle::Disabled => return TrackOutcome::Disabled,
            Lifecycle::Created | Lifecycle::Closed => return TrackOutcome::Idle,
        };
        let now = self.clock.unix_secs();
        let now_ms = self.clock.unix_millis();
        let page_url = canonicalize_url(&page.url);
        let path = page_path(&page.url);

        if let Some(reason) = self.debounce(&path, now_ms) {
            debug!(%path, ?reason, "pageview suppressed");
            return TrackOutcome::Suppressed(reason);
        }

        let exit = match self.exits.promote(now) {
            Promotion::Promoted(exit) => {
                self.transmit(&endpoint, &exit);
                Some(*exit)
            }
            Promotion::Discarded | Promotion::NoCandidate => None,
        };

        let visitor = match &self.visitor {
            Some(visitor) => visitor.clone(),
            None => {
                let visitor = self.identity.resolve_visitor(now);
                self.visitor = Some(visitor.clone());
                visitor
            }
        };
        let session = self
            .sessions
            .resolve_session(&query_pairs(&page.url), &page.referrer, now);
        let page_sequence = self.sequence.next_sequence(&session.session_id, now);
        let step = self.flow.previous(&session.session_id);

        let event = PageEvent {
            timestamp: now,
            session_id: session.session_id.to_string(),
            user_id: visitor.visitor_id.to_string(),
            visit_count: visitor.visit_count,
            is_new_visitor: flag(visitor.is_new_visitor),
            event_type: EventType::Pageview,
            page_url,
            page_title: page.title.clone(),
            page_path: path.clone(),
            page_sequence,
            is_landing_page: flag(page_sequence == 1),
            previous_page_url: step.previous_page_url,
            session_page_count: step.session_page_count,
            is_exit_page: 0,
            referrer: page.referrer.clone(),
            referrer_domain: wire_referrer_domain(&page.referrer, &session.attribution),
            tracking_code: session.attribution.tracking_code.clone(),
            utm_source: session.attribution.utm_source.clone(),
            utm_medium: session.attribution.utm_medium.clone(),
            utm_campaign: session.attribution.utm_campaign.clone(),
            utm_term: session.attribution.utm_term.clone(),
            utm_content: session.attribution.utm_content.clone(),
            user_agent: self.device.user_agent.clone(),
            device_type: self.profile.device_type.clone(),
            browser: self.profile.browser.clone(),
            os: self.profile.os.clone(),
            screen_resolution: self.profile.screen_resolution.clone(),
            language: self.device.language.clone(),
            time_on_page: 0,
        };
        let delivery = self.transmit(&endpoint, &event);

        self.exits.snapshot(&event, now);
        self.flow
            .record(&session.session_id, &event.page_url, event.session_page_count);
        write_state(
            self.stores.tab.as_ref(),
            keys::LAST_VIEW,
            &LastView {
                path: path.clone(),
                at_ms: now_ms,
            },
            None,
        );
        debug!(
            session = %session.session_id,
            page_sequence,
            path = %path,
            ?delivery,
            "pageview tracked"
        );

        self.navigation.reset(&page.url);
        self.last_tracked_path = Some(path);
        self.session_id = Some(session.session_id);
        self.current_page = Some(page.clone());
        self.page_started_at_ms = now_ms;

        TrackOutcome::Sent(Box::new(Pageview {
            event,
            delivery,
            exit,
        }))
    }

    pub fn on_navigation(&mut self, event: NavigationEvent) -> TrackOutcome {
        if !self.is_active() {
            return TrackOutcome::Idle;
        }
        let now_ms = self.clock.unix_millis();
        if !self.navigation.observe(event, now_ms) {
            return TrackOutcome::Idle;
        }
        match self.navigation.due_at() {
            Some(due_at_ms) => TrackOutcome::Scheduled { due_at_ms },
            None => TrackOutcome::Idle,
        }
    }

    /// Fires a route change whose settle delay has passed.
    pub fn poll(&mut self) -> TrackOutcome {
        if !self.is_active() {
            return TrackOutcome::Idle;
        }
        match self.navigation.take_due(self.clock.unix_millis()) {
            Some(route) => self.track_route(route),
            None => TrackOutcome::Idle,
        }
    }

    /// Fires the pending route change now. For hosts that run their own settle timer.
    pub fn flush_navigation(&mut self) -> TrackOutcome {
        if !self.is_active() {
            return TrackOutcome::Idle;
        }
        match self.navigation.take_pending() {
            Some(route) => self.track_route(route),
            None => TrackOutcome::Idle,
        }
    }

    /// Stores dwell time on the exit candidate. Never transmits.
    pub fn on_page_hide(&mut self) -> TrackOutcome {
        if !self.is_active() {
            return TrackOutcome::Idle;
        }
        let Some(session_id) = &self.session_id else {
            return TrackOutcome::Idle;
        };
        let now_ms = self.clock.unix_millis();
        let time_on_page = (now_ms.saturating_sub(self.page_started_at_ms).max(0) / 1_000) as u64;
        if self
            .exits
            .on_page_hide(session_id.as_str(), self.clock.unix_secs(), time_on_page)
        {
            debug!(session = %session_id, time_on_page, "exit candidate refreshed on hide");
        }
        TrackOutcome::Idle
    }

    pub fn shutdown(&mut self) -> TrackOutcome {
        let outcome = self.on_page_hide();
        if self.lifecycle != Lifecycle::Closed {
            debug!("tracker shut down");
        }
        self.lifecycle = Lifecycle::Closed;
        outcome
    }

    fn track_route(&mut self, route: PendingRoute) -> TrackOutcome {
        let mut page = self.current_page.clone().unwrap_or_default();
        page.url = route.url;
        if let Some(title) = route.title {
            page.title = title;
        }
        self.track_pageview(&page)
    }

    fn debounce(&self, path: &str, now_ms: i64) -> Option<SuppressReason> {
        if self.last_tracked_path.as_deref() == Some(path) {
            return Some(SuppressReason::SamePath);
        }
        let window = self.policy.debounce_ms.min(i64::MAX as u64) as i64;
        match read_state::<LastView>(self.stores.tab.as_ref(), keys::LAST_VIEW) {
            Some(last) if last.path == path && now_ms.saturating_sub(last.at_ms) < window => {
                Some(SuppressReason::Debounced)
            }
            _ => None,
        }
    }

    fn transmit(&self, endpoint: &str, event: &PageEvent) -> Delivery {
        match self.try_transmit(endpoint, event) {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(%err, event_type = ?event.event_type, session = %event.session_id, "event dropped");
                Delivery::Dropped
            }
        }
    }

    fn try_transmit(&self, endpoint: &str, event: &PageEvent) -> TrackResult<Delivery> {
        let body = serde_json::to_string(event)?;
        match self.emitter.emit(&Beacon::new(endpoint, body)) {
            Delivery::Dropped => Err(TrackError::Transport(format!(
                "no transport accepted the beacon for {endpoint}"
            ))),
            delivery => Ok(delivery),
        }
    }
}

fn wire_referrer_domain(referrer: &str, attribution: &SessionAttribution) -> String {
    let domain = referrer_domain(referrer);
    if domain.is_empty() && referrer.trim().is_empty() && attribution.is_direct {
        "(direct)".to_string()
    } else {
        domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;
    use footfall_transport::RecordingTransport;

    fn tracker() -> (ManualClock, RecordingTransport, Tracker) {
        let clock = ManualClock::at_unix(1_700_000_000);
        let recorder = RecordingTransport::new();
        let stores = StoreSet::in_memory(Arc::new(clock.clone()));
        let policy = TrackerPolicyView {
            allowed_domains: vec!["shop.test".into()],
            ..TrackerPolicyView::default()
        };
        let tracker = Tracker::new(
            stores,
            Emitter::new(Arc::new(recorder.clone())),
            Arc::new(clock.clone()),
            policy,
            DeviceContext::new("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0 Safari/537.36", 1920, 1080),
        );
        (clock, recorder, tracker)
    }

    #[test]
    fn unauthorized_host_disables_instance() {
        let (_, recorder, mut tracker) = tracker();
        assert_eq!(tracker.init(&PageContext::new("https://evil.test/")), TrackOutcome::Disabled);
        assert_eq!(
            tracker.track_pageview(&PageContext::new("https://evil.test/x")),
            TrackOutcome::Disabled
        );
        assert!(recorder.is_empty());
    }

    #[test]
    fn second_init_is_ignored() {
        let (_, recorder, mut tracker) = tracker();
        assert!(tracker.init(&PageContext::new("https://shop.test/")).pageview().is_some());
        assert_eq!(tracker.init(&PageContext::new("https://shop.test/")), TrackOutcome::Idle);
        assert_eq!(recorder.len(), 1);
        assert_eq!(tracker.gate_decision(), Some(GateDecision::Production));
    }

    #[test]
    fn track_before_init_is_idle() {
        let (_, recorder, mut tracker) = tracker();
        assert_eq!(
            tracker.track_pageview(&PageContext::new("https://shop.test/")),
            TrackOutcome::Idle
        );
        assert!(recorder.is_empty());
    }

    #[test]
    fn direct_landing_reports_direct_referrer_domain() {
        let (_, recorder, mut tracker) = tracker();
        let outcome = tracker.init(&PageContext::new("https://shop.test/?utm_term=x#top").with_title("Home"));
        let event = &outcome.pageview().unwrap().event;
        assert_eq!(event.page_url, "https://shop.test/");
        assert_eq!(event.referrer_domain, "(direct)");
        assert_eq!(event.utm_source, "(direct)");
        assert_eq!(event.browser, "Chrome");
        assert_eq!(event.device_type, "desktop");
        let body: PageEvent = serde_json::from_str(&recorder.sent()[0].body).unwrap();
        assert_eq!(&body, event);
        assert_eq!(recorder.sent()[0].endpoint, tracker.policy().production_endpoint);
    }

    #[test]
    fn shutdown_stops_tracking() {
        let (clock, recorder, mut tracker) = tracker();
        tracker.init(&PageContext::new("https://shop.test/"));
        clock.advance_secs(5);
        tracker.shutdown();
        assert_eq!(
            tracker.track_pageview(&PageContext::new("https://shop.test/next")),
            TrackOutcome::Idle
        );
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn configured_session_timeout_is_honoured() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let recorder = RecordingTransport::new();
        let policy = TrackerPolicyView {
            allowed_domains: vec!["shop.test".into()],
            session_timeout_secs: 1_800,
            ..TrackerPolicyView::default()
        };
        let mut tracker = Tracker::new(
            StoreSet::in_memory(Arc::new(clock.clone())),
            Emitter::new(Arc::new(recorder.clone())),
            Arc::new(clock.clone()),
            policy,
            DeviceContext::default(),
        );
        let first = tracker.init(&PageContext::new("https://shop.test/"));
        clock.advance_secs(600);
        let second = tracker.track_pageview(&PageContext::new("https://shop.test/cart"));
        let (first, second) = (&first.pageview().unwrap().event, second.pageview().unwrap());
        assert_eq!(second.event.session_id, first.session_id);
        assert_eq!(second.event.page_sequence, 2);
        assert!(second.exit.is_none());
    }

    #[test]
    fn dropped_delivery_still_advances_state() {
        let (clock, recorder, mut tracker) = tracker();
        recorder.set_rejecting(true);
        let first = tracker.init(&PageContext::new("https://shop.test/"));
        assert_eq!(first.pageview().unwrap().delivery, Delivery::Dropped);
        recorder.set_rejecting(false);
        clock.advance_secs(3);
        let second = tracker.track_pageview(&PageContext::new("https://shop.test/cart"));
        assert_eq!(second.pageview().unwrap().event.page_sequence, 2);
    }
}
