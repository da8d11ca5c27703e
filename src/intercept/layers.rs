//! Fixed rule sets for the non-list layers.

use crate::engine::{BlockPattern, PatternMatcher};
use std::sync::Arc;

/// Site endpoints that only ever serve ads or telemetry.
pub const SITE_ENDPOINTS: &[&str] = &[
    "*://www.youtube.com/api/stats/*",
    "*://www.youtube.com/pagead/*",
    "*://www.youtube.com/ptracking*",
    "*://www.youtube.com/*?*adformat=*",
    "*://www.youtube.com/youtubei/v1/log_event*",
];

/// Cheap pre-filter: the keyword layer never sees a URL without one of these.
pub const KEYWORD_PREFILTER: &[&str] = &["ad", "sponsor", "track", "analytics", "metric", "pixel"];

/// Path, host and parameter fragments that mark a URL as an ad.
pub const AD_MARKERS: &[&str] = &[
    "/ad/",
    "/ads/",
    "/advert/",
    "/advertising/",
    "doubleclick",
    "googleads",
    "googlesyndication",
    "ad_type=",
    "ad_block=",
    "adformat=",
    "adunit=",
    "adposition=",
    "adserve",
    "youtube.com/pagead/",
    "youtube.com/api/stats/ads",
];

/// Registered only when every other layer failed to register.
pub const FALLBACK_PATTERNS: &[&str] = &[
    "*://*.googlesyndication.com/*",
    "*://*.doubleclick.net/*",
    "*://www.youtube.com/api/stats/ads*",
];

/// First ad marker found in a lowercased URL.
pub fn keyword_marker(lower_url: &str) -> Option<&'static str> {
    AD_MARKERS.iter().copied().find(|m| lower_url.contains(m))
}

pub(crate) fn matcher_for(globs: &[&str]) -> Arc<PatternMatcher> {
    Arc::new(PatternMatcher::new(
        globs.iter().filter_map(|g| BlockPattern::parse(g)).collect(),
    ))
}
