pub mod host;
pub mod referrer;
pub mod url;
pub mod utm;

pub use host::{host_matches, matches_any};
pub use referrer::{referrer_domain, tracking_code};
pub use url::{canonicalize_url, host_of, page_path, query_pairs, QueryMap};
pub use utm::UtmParams;
