use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static SHORT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/t/([^/]+)/?$").expect("short link regex"));

/// Host of the referrer, empty when the referrer is empty or unparsable.
pub fn referrer_domain(referrer: &str) -> String {
    Url::parse(referrer)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Code from a short-link referrer such as `https://go.example.com/t/SPRING24`.
pub fn tracking_code(referrer: &str) -> Option<String> {
    let parsed = Url::parse(referrer).ok()?;
    SHORT_LINK
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .map(|code| code.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_from_referrer() {
        assert_eq!(referrer_domain("https://www.Google.com/search?q=x"), "www.google.com");
        assert_eq!(referrer_domain(""), "");
        assert_eq!(referrer_domain("garbage"), "");
    }

    #[test]
    fn short_link_code() {
        assert_eq!(
            tracking_code("https://go.example.com/t/SPRING24"),
            Some("SPRING24".into())
        );
        assert_eq!(
            tracking_code("https://go.example.com/t/abc-1/?ref=mail"),
            Some("abc-1".into())
        );
        assert_eq!(tracking_code("https://go.example.com/t/a/b"), None);
        assert_eq!(tracking_code("https://go.example.com/tag/abc"), None);
        assert_eq!(tracking_code(""), None);
    }
}
