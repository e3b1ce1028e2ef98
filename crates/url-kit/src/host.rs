/// Exact or dot-suffix match. A pattern written as `.example.com` or
/// `*.example.com` only matches subdomains.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let pattern = pattern.trim().to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    if let Some(suffix) = pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
    {
        return host.len() > suffix.len()
            && host.ends_with(suffix)
            && host[..host.len() - suffix.len()].ends_with('.');
    }
    host == pattern
        || (host.ends_with(&pattern) && host[..host.len() - pattern.len()].ends_with('.'))
}

pub fn matches_any<S: AsRef<str>>(host: &str, patterns: &[S]) -> bool {
    patterns
        .iter()
        .any(|pattern| host_matches(host, pattern.as_ref()))
}
