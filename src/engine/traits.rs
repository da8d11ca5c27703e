use super::fetcher::FilterList;
use super::pattern::{BlockPattern, CandidateUrl};
use super::store::ActiveFilterSet;
use crate::error::FilterError;
use std::sync::Arc;

/// The "Hot Path" check of a URL against a pattern set.
pub trait UrlMatcher: Send + Sync {
    /// Returns the first pattern matching `url`, if any.
    fn check(&self, url: &CandidateUrl) -> Option<&BlockPattern>;
}

/// The "Control Plane" for filter-list updates.
#[async_trait::async_trait]
pub trait FilterManager: Send + Sync {
    /// Fetches (or reuses cached) lists and builds a new filter set.
    /// `force` ignores the cache age policy. Returns the set active once
    /// the refresh is done, which is a newer one if another refresh
    /// started later and finished first.
    async fn refresh(&self, force: bool) -> Arc<ActiveFilterSet>;
}

/// Where list contents come from: keeps a list's cache current and reads
/// it back as patterns.
#[async_trait::async_trait]
pub trait ListSource: Send + Sync {
    async fn fetch(&self, list: &FilterList, force: bool) -> Result<bool, FilterError>;
    async fn parse(&self, list: &FilterList) -> Result<Vec<BlockPattern>, FilterError>;
}
