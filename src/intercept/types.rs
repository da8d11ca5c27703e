use crate::engine::{CandidateUrl, PatternMatcher, PatternStore, UrlMatcher};
use std::fmt;
use std::sync::Arc;

/// An outbound request as seen by the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub context: String,
    pub url: String,
}

impl InterceptedRequest {
    pub fn new(context: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_deny(self) -> bool {
        self == Decision::Deny
    }
}

/// The independent matcher layers registered on each browsing context,
/// in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Core,
    SiteSpecific,
    PatternSet,
    Keyword,
    Fallback,
}

impl Layer {
    pub fn name(self) -> &'static str {
        match self {
            Layer::Core => "core",
            Layer::SiteSpecific => "site",
            Layer::PatternSet => "patterns",
            Layer::Keyword => "keyword",
            Layer::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which URLs a registration wants to see. The pipeline only invokes the
/// handler when this matches.
#[derive(Clone)]
pub enum UrlFilter {
    /// A fixed glob list, captured at registration time.
    Static(Arc<PatternMatcher>),
    /// Whatever the store holds at request time.
    Live(Arc<PatternStore>),
    /// Any URL containing one of these lowercase substrings.
    Substrings(&'static [&'static str]),
}

impl UrlFilter {
    pub fn is_empty(&self) -> bool {
        match self {
            UrlFilter::Static(m) => m.is_empty(),
            UrlFilter::Live(_) => false,
            UrlFilter::Substrings(s) => s.is_empty(),
        }
    }

    /// Returns the rule text that selected the URL. `lower` is the
    /// lowercased raw URL; `parsed` is `None` when the URL did not parse,
    /// in which case glob filters never match.
    pub fn find_match(&self, lower: &str, parsed: Option<&CandidateUrl>) -> Option<String> {
        match self {
            UrlFilter::Static(matcher) => parsed
                .and_then(|url| matcher.check(url))
                .map(|p| p.as_str().to_string()),
            UrlFilter::Live(store) => parsed.and_then(|url| {
                store
                    .snapshot()
                    .matcher()
                    .check(url)
                    .map(|p| p.as_str().to_string())
            }),
            UrlFilter::Substrings(keys) => keys
                .iter()
                .find(|k| lower.contains(*k))
                .map(|k| k.to_string()),
        }
    }
}

impl fmt::Debug for UrlFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlFilter::Static(m) => write!(f, "Static({} patterns)", m.len()),
            UrlFilter::Live(store) => write!(f, "Live(epoch {})", store.snapshot().epoch()),
            UrlFilter::Substrings(s) => write!(f, "Substrings({:?})", s),
        }
    }
}

/// Decides one request that a registration's filter selected. The second
/// argument is the rule text reported by [`UrlFilter::find_match`].
pub type RequestHandler = Arc<dyn Fn(&InterceptedRequest, &str) -> Decision + Send + Sync>;

#[derive(Clone)]
pub struct MatcherRegistration {
    pub name: String,
    pub filter: UrlFilter,
    pub handler: RequestHandler,
}

impl fmt::Debug for MatcherRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistration")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);
