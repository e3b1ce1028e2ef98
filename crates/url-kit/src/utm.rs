use serde::{Deserialize, Serialize};

use crate::url::QueryMap;

pub const UTM_SOURCE: &str = "utm_source";
pub const UTM_MEDIUM: &str = "utm_medium";
pub const UTM_CAMPAIGN: &str = "utm_campaign";
pub const UTM_TERM: &str = "utm_term";
pub const UTM_CONTENT: &str = "utm_content";

/// Campaign parameters as they appear on a landing URL. Absent fields are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtmParams {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub term: String,
    pub content: String,
}

impl UtmParams {
    pub fn from_query(query: &QueryMap) -> Self {
        let field = |key: &str| query.get(key).cloned().unwrap_or_default();
        Self {
            source: field(UTM_SOURCE),
            medium: field(UTM_MEDIUM),
            campaign: field(UTM_CAMPAIGN),
            term: field(UTM_TERM),
            content: field(UTM_CONTENT),
        }
    }

    /// True when any of the attribution-bearing keys (campaign, source, medium) is set.
    pub fn is_campaign(&self) -> bool {
        !self.campaign.is_empty() || !self.source.is_empty() || !self.medium.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::query_pairs;

    #[test]
    fn term_alone_is_not_a_campaign() {
        let params = UtmParams::from_query(&query_pairs("https://x.test/?utm_term=shoes"));
        assert!(!params.is_campaign());
        assert_eq!(params.term, "shoes");
    }

    #[test]
    fn copies_fields_verbatim() {
        let params = UtmParams::from_query(&query_pairs(
            "https://x.test/?utm_source=facebook&utm_campaign=Spring%20Sale",
        ));
        assert!(params.is_campaign());
        assert_eq!(params.source, "facebook");
        assert_eq!(params.campaign, "Spring Sale");
        assert_eq!(params.medium, "");
    }
}
