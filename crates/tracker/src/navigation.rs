use footfall_url::page_path;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Route change pushed by the host router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationEvent {
    Push { url: String, title: Option<String> },
    Replace { url: String, title: Option<String> },
    Pop { url: String, title: Option<String> },
}

impl NavigationEvent {
    pub fn push(url: impl Into<String>) -> Self {
        NavigationEvent::Push {
            url: url.into(),
            title: None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NavigationEvent::Push { url, .. }
            | NavigationEvent::Replace { url, .. }
            | NavigationEvent::Pop { url, .. } => url,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            NavigationEvent::Push { title, .. }
            | NavigationEvent::Replace { title, .. }
            | NavigationEvent::Pop { title, .. } => title.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRoute {
    pub url: String,
    pub title: Option<String>,
    pub due_at_ms: i64,
}

/// Turns raw route notifications into at most one pending pageview.
#[derive(Debug, Clone)]
pub struct NavigationObserver {
    current_path: Option<String>,
    pending: Option<PendingRoute>,
    settle_ms: i64,
}

impl NavigationObserver {
    pub fn new(settle_ms: u64) -> Self {
        Self {
            current_path: None,
            pending: None,
            settle_ms: settle_ms.min(i64::MAX as u64) as i64,
        }
    }

    pub fn reset(&mut self, url: &str) {
        self.current_path = Some(page_path(url));
        self.pending = None;
    }

    /// Returns true when the event changed the pathname and a pageview is now scheduled.
    /// A later change before the settle delay replaces the pending route.
    pub fn observe(&mut self, event: NavigationEvent, now_ms: i64) -> bool {
        let path = page_path(event.url());
        if self.current_path.as_deref() == Some(path.as_str()) {
            debug!(%path, "navigation without path change ignored");
            return false;
        }
        self.current_path = Some(path);
        let title = event.title().map(str::to_string);
        let url = match event {
            NavigationEvent::Push { url, .. }
            | NavigationEvent::Replace { url, .. }
            | NavigationEvent::Pop { url, .. } => url,
        };
        self.pending = Some(PendingRoute {
            url,
            title,
            due_at_ms: now_ms.saturating_add(self.settle_ms),
        });
        true
    }

    pub fn due_at(&self) -> Option<i64> {
        self.pending.as_ref().map(|route| route.due_at_ms)
    }

    pub fn take_due(&mut self, now_ms: i64) -> Option<PendingRoute> {
        match &self.pending {
            Some(route) if route.due_at_ms <= now_ms => self.pending.take(),
            _ => None,
        }
    }

    /// Hands over the pending route regardless of its due time.
    pub fn take_pending(&mut self) -> Option<PendingRoute> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> NavigationObserver {
        let mut observer = NavigationObserver::new(100);
        observer.reset("https://shop.test/home");
        observer
    }

    #[test]
    fn hash_and_query_changes_are_ignored() {
        let mut observer = observer();
        assert!(!observer.observe(NavigationEvent::push("https://shop.test/home#reviews"), 0));
        assert!(!observer.observe(NavigationEvent::push("https://shop.test/home?tab=2"), 0));
        assert_eq!(observer.due_at(), None);
    }

    #[test]
    fn path_change_settles_before_firing() {
        let mut observer = observer();
        let event = NavigationEvent::Replace {
            url: "https://shop.test/products/7?ref=nav".into(),
            title: Some("Product 7".into()),
        };
        assert!(observer.observe(event, 1_000));
        assert_eq!(observer.take_due(1_050), None);
        let route = observer.take_due(1_100).unwrap();
        assert_eq!(route.url, "https://shop.test/products/7?ref=nav");
        assert_eq!(route.title.as_deref(), Some("Product 7"));
        assert_eq!(observer.take_due(2_000), None);
    }

    #[test]
    fn rapid_changes_keep_latest_route() {
        let mut observer = observer();
        observer.observe(NavigationEvent::push("https://shop.test/a"), 0);
        observer.observe(NavigationEvent::push("https://shop.test/b"), 50);
        assert_eq!(observer.due_at(), Some(150));
        assert_eq!(observer.take_pending().unwrap().url, "https://shop.test/b");
    }

    #[test]
    fn pop_back_to_previous_path_counts() {
        let mut observer = observer();
        observer.observe(NavigationEvent::push("https://shop.test/a"), 0);
        observer.take_pending();
        let back = NavigationEvent::Pop {
            url: "https://shop.test/home".into(),
            title: None,
        };
        assert!(observer.observe(back, 10));
    }
}
