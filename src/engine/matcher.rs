use super::pattern::{BlockPattern, CandidateUrl};
use super::traits::UrlMatcher;
use rustc_hash::FxHashMap;

/// In-memory matcher over a fixed pattern list.
///
/// Patterns anchored on a concrete domain are indexed by that domain and
/// found with a label-by-label suffix walk of the request host; the rest
/// (host `*` or mid-host wildcards) are scanned linearly.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    patterns: Vec<BlockPattern>,
    // anchor domain -> indices into `patterns`
    by_domain: FxHashMap<Box<str>, Vec<u32>>,
    unanchored: Vec<u32>,
}

impl PatternMatcher {
    pub fn new(patterns: Vec<BlockPattern>) -> Self {
        let mut by_domain: FxHashMap<Box<str>, Vec<u32>> = FxHashMap::default();
        let mut unanchored = Vec::new();

        for (idx, pattern) in patterns.iter().enumerate() {
            let idx = idx as u32;
            match pattern.anchor_domain() {
                Some(domain) => by_domain.entry(domain.into()).or_default().push(idx),
                None => unanchored.push(idx),
            }
        }

        Self {
            patterns,
            by_domain,
            unanchored,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[BlockPattern] {
        &self.patterns
    }

    /// Every URL glob this matcher evaluates, in insertion order.
    pub fn globs(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl UrlMatcher for PatternMatcher {
    fn check(&self, url: &CandidateUrl) -> Option<&BlockPattern> {
        // 1. Suffix walk over the host labels
        let mut part = url.host();
        loop {
            if let Some(indices) = self.by_domain.get(part) {
                for &idx in indices {
                    let pattern = &self.patterns[idx as usize];
                    if pattern.matches(url) {
                        return Some(pattern);
                    }
                }
            }

            match part.find('.') {
                Some(idx) => {
                    part = &part[idx + 1..];
                    if part.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        // 2. Linear scan of the unanchored globs
        self.unanchored
            .iter()
            .map(|&idx| &self.patterns[idx as usize])
            .find(|pattern| pattern.matches(url))
    }
}
