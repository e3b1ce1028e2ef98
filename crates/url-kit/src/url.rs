use std::collections::BTreeMap;

use url::Url;

/// Decoded query parameters; the first occurrence of a key wins.
pub type QueryMap = BTreeMap<String, String>;

/// Drops query and fragment. Unparsable input is cut at the first `?` or `#`.
pub fn canonicalize_url(raw: &str) -> String {
    if let Ok(mut parsed) = Url::parse(raw) {
        parsed.set_query(None);
        parsed.set_fragment(None);
        parsed.to_string()
    } else {
        let end = raw.find(|c: char| c == '?' || c == '#').unwrap_or(raw.len());
        raw[..end].to_string()
    }
}

pub fn page_path(raw: &str) -> String {
    if let Ok(parsed) = Url::parse(raw) {
        return parsed.path().to_string();
    }
    let end = raw.find(|c: char| c == '?' || c == '#').unwrap_or(raw.len());
    let path = &raw[..end];
    if path.starts_with('/') {
        path.to_string()
    } else {
        "/".to_string()
    }
}

pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
}

pub fn query_pairs(raw: &str) -> QueryMap {
    let mut out = QueryMap::new();
    if let Ok(parsed) = Url::parse(raw) {
        for (key, value) in parsed.query_pairs() {
            out.entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
    out
}
