//! Scripted browsing journeys replayed against a tracker on a manual clock.
//!
//! ```yaml
//! start_at: 1700000000
//! device: { user_agent: "Mozilla/5.0 (iPhone; ...)", screen_width: 390, screen_height: 844 }
//! steps:
//!   - { tab: a, action: load, url: "https://shop.test/?utm_source=google&utm_medium=cpc" }
//!   - { after: 20s, tab: a, action: navigate, url: "https://shop.test/cart" }
//!   - { after: 5s, tab: a, action: close }
//!   - { after: 3m, tab: b, action: load, url: "https://shop.test/" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use footfall_core_types::{Clock, ManualClock};
use footfall_storage::{MemoryStore, StoreSet};
use footfall_tracker::{
    DeviceContext, EventType, NavigationEvent, PageContext, PageEvent, SuppressReason,
    TrackOutcome, Tracker, TrackerPolicyView,
};
use footfall_transport::Emitter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JourneyError {
    #[error("failed to read journey script: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid journey script: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("step {step}: invalid delay {value:?}: {source}")]
    Delay {
        step: usize,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("step {step}: tab {tab} has no page loaded")]
    NoPage { step: usize, tab: String },
}

pub type JourneyResult<T> = Result<T, JourneyError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    /// Unix seconds of the first step; the current time when absent.
    #[serde(default)]
    pub start_at: Option<i64>,
    #[serde(default)]
    pub device: DeviceContext,
    pub steps: Vec<JourneyStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStep {
    /// Delay before this step, e.g. `500ms`, `20s`, `3m`.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default = "default_tab")]
    pub tab: String,
    #[serde(flatten)]
    pub action: StepAction,
}

fn default_tab() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Load {
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        referrer: String,
    },
    Navigate {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Hide,
    Reload,
    Close,
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Load { .. } => "load",
            StepAction::Navigate { .. } => "navigate",
            StepAction::Hide => "hide",
            StepAction::Reload => "reload",
            StepAction::Close => "close",
        }
    }
}

impl Journey {
    pub fn from_yaml(raw: &str) -> JourneyResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> JourneyResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Sent,
    Suppressed,
    Disabled,
    Scheduled,
    Idle,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub at: i64,
    pub tab: String,
    pub action: &'static str,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressReason>,
    /// Exit event first when one was promoted, then the pageview.
    pub events: Vec<PageEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub steps: Vec<StepReport>,
    pub pageviews: usize,
    pub exits: usize,
    pub sessions: usize,
}

impl ReplaySummary {
    fn from_steps(steps: Vec<StepReport>) -> Self {
        let (pageviews, exits, sessions) = {
            let mut pageviews = 0;
            let mut exits = 0;
            let mut sessions = BTreeSet::new();
            for event in steps.iter().flat_map(|step| step.events.iter()) {
                match event.event_type {
                    EventType::Pageview => pageviews += 1,
                    EventType::PageExit => exits += 1,
                }
                sessions.insert(event.session_id.as_str());
            }
            (pageviews, exits, sessions.len())
        };
        Self {
            steps,
            pageviews,
            exits,
            sessions,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &PageEvent> {
        self.steps.iter().flat_map(|step| step.events.iter())
    }
}

struct Tab {
    stores: StoreSet,
    tracker: Tracker,
    page: PageContext,
}

/// Drives one tracker per tab over shared origin stores.
pub struct Replayer {
    clock: ManualClock,
    origin: StoreSet,
    emitter: Emitter,
    policy: TrackerPolicyView,
    tabs: BTreeMap<String, Tab>,
}

impl Replayer {
    pub fn new(
        clock: ManualClock,
        origin: StoreSet,
        emitter: Emitter,
        policy: TrackerPolicyView,
    ) -> Self {
        Self {
            clock,
            origin,
            emitter,
            policy,
            tabs: BTreeMap::new(),
        }
    }

    pub fn run(&mut self, journey: &Journey) -> JourneyResult<ReplaySummary> {
        let mut reports = Vec::with_capacity(journey.steps.len());
        for (index, step) in journey.steps.iter().enumerate() {
            let step_no = index + 1;
            if let Some(raw) = &step.after {
                let delay = humantime::parse_duration(raw.trim()).map_err(|source| {
                    JourneyError::Delay {
                        step: step_no,
                        value: raw.clone(),
                        source,
                    }
                })?;
                self.clock.advance(delay);
            }
            reports.push(self.step(step_no, step, &journey.device)?);
        }
        for tab in self.tabs.values_mut() {
            tab.tracker.shutdown();
        }
        Ok(ReplaySummary::from_steps(reports))
    }

    fn step(
        &mut self,
        step_no: usize,
        step: &JourneyStep,
        device: &DeviceContext,
    ) -> JourneyResult<StepReport> {
        let at = self.clock.unix_secs();
        debug!(step = step_no, tab = %step.tab, action = step.action.name(), at, "replaying step");
        let outcome = match &step.action {
            StepAction::Load {
                url,
                title,
                referrer,
            } => {
                let page = PageContext::new(url.clone())
                    .with_title(title.clone())
                    .with_referrer(referrer.clone());
                let stores = match self.tabs.remove(&step.tab) {
                    Some(mut previous) => {
                        previous.tracker.shutdown();
                        previous.stores
                    }
                    None => self.open_tab(),
                };
                self.start(&step.tab, stores, page, device)
            }
            StepAction::Reload => {
                let mut previous = self.take_tab(step_no, &step.tab)?;
                previous.tracker.shutdown();
                self.start(&step.tab, previous.stores, previous.page, device)
            }
            StepAction::Navigate { url, title } => {
                let settle = self.policy.settle_delay();
                let tab = self.tab_mut(step_no, &step.tab)?;
                let event = NavigationEvent::Push {
                    url: url.clone(),
                    title: title.clone(),
                };
                match tab.tracker.on_navigation(event) {
                    TrackOutcome::Scheduled { .. } => {
                        tab.page.url = url.clone();
                        if let Some(title) = title {
                            tab.page.title = title.clone();
                        }
                        self.clock.advance(settle);
                        let tab = self.tab_mut(step_no, &step.tab)?;
                        tab.tracker.poll()
                    }
                    other => other,
                }
            }
            StepAction::Hide => self.tab_mut(step_no, &step.tab)?.tracker.on_page_hide(),
            StepAction::Close => {
                let mut tab = self.take_tab(step_no, &step.tab)?;
                tab.tracker.shutdown()
            }
        };
        Ok(report(step_no, at, &step.tab, step.action.name(), outcome))
    }

    fn open_tab(&self) -> StoreSet {
        self.origin
            .with_tab(Arc::new(MemoryStore::new(Arc::new(self.clock.clone()))))
    }

    fn start(
        &mut self,
        name: &str,
        stores: StoreSet,
        page: PageContext,
        device: &DeviceContext,
    ) -> TrackOutcome {
        let mut tracker = Tracker::new(
            stores.clone(),
            self.emitter.clone(),
            Arc::new(self.clock.clone()),
            self.policy.clone(),
            device.clone(),
        );
        let outcome = tracker.init(&page);
        self.tabs.insert(
            name.to_string(),
            Tab {
                stores,
                tracker,
                page,
            },
        );
        outcome
    }

    fn tab_mut(&mut self, step: usize, name: &str) -> JourneyResult<&mut Tab> {
        self.tabs.get_mut(name).ok_or_else(|| JourneyError::NoPage {
            step,
            tab: name.to_string(),
        })
    }

    fn take_tab(&mut self, step: usize, name: &str) -> JourneyResult<Tab> {
        self.tabs.remove(name).ok_or_else(|| JourneyError::NoPage {
            step,
            tab: name.to_string(),
        })
    }
}

fn report(step: usize, at: i64, tab: &str, action: &'static str, outcome: TrackOutcome) -> StepReport {
    let (kind, reason, events) = match outcome {
        TrackOutcome::Sent(pageview) => {
            let pageview = *pageview;
            let mut events = Vec::with_capacity(2);
            events.extend(pageview.exit);
            events.push(pageview.event);
            (OutcomeKind::Sent, None, events)
        }
        TrackOutcome::Suppressed(reason) => (OutcomeKind::Suppressed, Some(reason), Vec::new()),
        TrackOutcome::Disabled => (OutcomeKind::Disabled, None, Vec::new()),
        TrackOutcome::Scheduled { .. } => (OutcomeKind::Scheduled, None, Vec::new()),
        TrackOutcome::Idle => (OutcomeKind::Idle, None, Vec::new()),
    };
    StepReport {
        step,
        at,
        tab: tab.to_string(),
        action,
        outcome: kind,
        reason,
        events,
    }
}
