use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    PageExit,
}

/// What the host knows about the page being shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: String,
}

impl PageContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }
}

/// One telemetry event as posted to the collector. Flags are encoded as 0/1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEvent {
    pub timestamp: i64,
    pub session_id: String,
    pub user_id: String,
    pub visit_count: u32,
    pub is_new_visitor: u8,
    pub event_type: EventType,
    pub page_url: String,
    pub page_title: String,
    pub page_path: String,
    pub page_sequence: u32,
    pub is_landing_page: u8,
    pub previous_page_url: String,
    pub session_page_count: u32,
    pub is_exit_page: u8,
    pub referrer: String,
    pub referrer_domain: String,
    pub tracking_code: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_term: String,
    pub utm_content: String,
    pub user_agent: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub screen_resolution: String,
    pub language: String,
    pub time_on_page: u64,
}

impl PageEvent {
    pub fn is_pageview(&self) -> bool {
        self.event_type == EventType::Pageview
    }

    pub fn is_landing(&self) -> bool {
        self.is_landing_page == 1
    }

    /// Exit event derived from the snapshot of the last pageview, stamped one
    /// second after that page's last recorded activity.
    pub fn into_exit(self, last_activity_at: i64, time_on_page: u64) -> Self {
        Self {
            timestamp: last_activity_at.saturating_add(1),
            event_type: EventType::PageExit,
            is_exit_page: 1,
            time_on_page,
            ..self
        }
    }
}

pub(crate) fn flag(value: bool) -> u8 {
    u8::from(value)
}

#[cfg(test)]
pub(crate) fn sample_event(session_id: &str, page_url: &str) -> PageEvent {
    PageEvent {
        timestamp: 0,
        session_id: session_id.into(),
        user_id: "visitor".into(),
        visit_count: 1,
        is_new_visitor: 1,
        event_type: EventType::Pageview,
        page_url: page_url.into(),
        page_title: String::new(),
        page_path: "/".into(),
        page_sequence: 1,
        is_landing_page: 1,
        previous_page_url: String::new(),
        session_page_count: 1,
        is_exit_page: 0,
        referrer: String::new(),
        referrer_domain: "(direct)".into(),
        tracking_code: String::new(),
        utm_source: "(direct)".into(),
        utm_medium: "(none)".into(),
        utm_campaign: String::new(),
        utm_term: String::new(),
        utm_content: String::new(),
        user_agent: String::new(),
        device_type: "desktop".into(),
        browser: "Other".into(),
        os: "Other".into(),
        screen_resolution: "0x0".into(),
        language: String::new(),
        time_on_page: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_keeps_snapshot_fields() {
        let exit = sample_event("s1", "https://shop.test/cart").into_exit(41, 12);
        assert_eq!(exit.timestamp, 42);
        assert_eq!(exit.event_type, EventType::PageExit);
        assert_eq!(exit.is_exit_page, 1);
        assert_eq!(exit.time_on_page, 12);
        assert_eq!(exit.page_url, "https://shop.test/cart");
        assert!(exit.is_landing());
    }

    #[test]
    fn event_type_wire_names() {
        assert_eq!(serde_json::to_value(EventType::Pageview).unwrap(), json!("pageview"));
        assert_eq!(serde_json::to_value(EventType::PageExit).unwrap(), json!("page_exit"));
    }

    #[test]
    fn page_context_builder() {
        let page = PageContext::new("https://shop.test/")
            .with_title("Home")
            .with_referrer("https://www.google.com/");
        assert_eq!(page.title, "Home");
        assert_eq!(page.referrer, "https://www.google.com/");
        let parsed: PageContext = serde_json::from_str(r#"{"url":"/x"}"#).unwrap();
        assert_eq!(parsed.title, "");
    }
}
