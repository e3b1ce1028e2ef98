use serde::{Deserialize, Serialize};

const MOBILE_MAX_WIDTH: u32 = 768;

/// Host-supplied browser facts. Fixed for the lifetime of a page context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceContext {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub screen_resolution: String,
}

impl DeviceContext {
    pub fn new(user_agent: impl Into<String>, screen_width: u32, screen_height: u32) -> Self {
        Self {
            user_agent: user_agent.into(),
            screen_width,
            screen_height,
            language: String::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile {
            device_type: device_type(&self.user_agent, self.screen_width).into(),
            browser: browser(&self.user_agent).into(),
            os: os(&self.user_agent).into(),
            screen_resolution: format!("{}x{}", self.screen_width, self.screen_height),
        }
    }
}

fn has(ua: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| ua.contains(needle))
}

fn device_type(ua: &str, screen_width: u32) -> &'static str {
    if has(ua, &["iPad", "Tablet", "PlayBook"]) || (ua.contains("Android") && !ua.contains("Mobile")) {
        return "tablet";
    }
    if has(ua, &["Mobi", "iPhone", "iPod", "Windows Phone"]) {
        return "mobile";
    }
    if screen_width > 0 && screen_width < MOBILE_MAX_WIDTH {
        return "mobile";
    }
    "desktop"
}

// Order matters: Edge and Opera carry "Chrome/", Chrome carries "Safari/".
fn browser(ua: &str) -> &'static str {
    if has(ua, &["Edg/", "Edge/", "EdgA/", "EdgiOS/"]) {
        "Edge"
    } else if has(ua, &["OPR/", "Opera"]) {
        "Opera"
    } else if ua.contains("SamsungBrowser") {
        "Samsung Internet"
    } else if has(ua, &["CriOS/", "Chrome/"]) {
        "Chrome"
    } else if has(ua, &["FxiOS/", "Firefox/"]) {
        "Firefox"
    } else if has(ua, &["MSIE ", "Trident/"]) {
        "Internet Explorer"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        "Other"
    }
}

fn os(ua: &str) -> &'static str {
    if has(ua, &["iPhone", "iPad", "iPod"]) {
        "iOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Windows") {
        "Windows"
    } else if has(ua, &["Mac OS X", "Macintosh"]) {
        "macOS"
    } else if ua.contains("CrOS") {
        "Chrome OS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Other"
    }
}
