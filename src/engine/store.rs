use super::matcher::PatternMatcher;
use super::pattern::BlockPattern;
use arc_swap::ArcSwap;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Baseline patterns present in every filter set, whatever the fetch outcome.
pub const CORE_PATTERNS: &[&str] = &[
    // Standard ad domains
    "*://*.doubleclick.net/*",
    "*://*.googlesyndication.com/*",
    "*://*.googleadservices.com/*",
    "*://*.google-analytics.com/*",
    "*://*.googletagservices.com/*",
    "*://*.googletagmanager.com/*",
    "*://*.moatads.com/*",
    "*://*.adsystem.com/*",
    "*://*.adservice.google.*/*",
    "*://*.ggpht.com/*.svg",
    // Site-specific ad and tracking endpoints
    "*://www.youtube.com/api/stats/ads*",
    "*://www.youtube.com/pagead/*",
    "*://www.youtube.com/ptracking*",
    "*://www.youtube.com/youtubei/v1/log_event*",
    "*://www.youtube.com/generate_204*",
    "*://www.youtube.com/error_204*",
    "*://www.youtube.com/get_midroll_*",
    "*://www.youtube.com/api/stats/delayplay*",
    "*://www.youtube.com/api/stats/watchtime*",
    "*://ad.youtube.com/*",
    "*://ads.youtube.com/*",
    "*://s.youtube.com/api/stats/qoe*",
    "*://i.ytimg.com/vi/*/hqdefault_live.jpg*",
    "*://*/videoplayback*&adt=*",
    "*://*/videoplayback*&adformat=*",
    "*://*/videoplayback*&afc=*",
    // Ad tracking parameters
    "*://*/*&ad_type=*",
    "*://*/*&adurl=*",
    "*://*/*?adurl=*",
    "*://*/*&adformat=*",
    "*://*/*?adformat=*",
];

/// The core patterns, parsed.
pub fn core_patterns() -> Vec<BlockPattern> {
    CORE_PATTERNS
        .iter()
        .filter_map(|g| BlockPattern::parse(g))
        .collect()
}

/// Merged, de-duplicated union of the core patterns and every list's
/// patterns, with its registration batches precomputed.
#[derive(Debug)]
pub struct ActiveFilterSet {
    epoch: u64,
    matcher: PatternMatcher,
    batches: Vec<Arc<PatternMatcher>>,
}

impl ActiveFilterSet {
    /// Builds a set from pattern groups, core patterns first. Order is
    /// stable: first occurrence wins on duplicates.
    pub fn build(epoch: u64, groups: Vec<Vec<BlockPattern>>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let mut seen = FxHashSet::default();
        let mut merged = Vec::new();
        let mut raw_count = 0usize;

        for pattern in core_patterns().into_iter().chain(groups.into_iter().flatten()) {
            raw_count += 1;
            if seen.insert(pattern.as_str().to_string()) {
                merged.push(pattern);
            }
        }

        let batches = merged
            .chunks(batch_size)
            .map(|chunk| Arc::new(PatternMatcher::new(chunk.to_vec())))
            .collect();

        info!(
            "Built filter set epoch {}: {} distinct patterns (from {} raw)",
            epoch,
            merged.len(),
            raw_count
        );

        Self {
            epoch,
            matcher: PatternMatcher::new(merged),
            batches,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn patterns(&self) -> &[BlockPattern] {
        self.matcher.patterns()
    }

    pub fn len(&self) -> usize {
        self.matcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    /// Non-empty groups of at most `batch_size` patterns, for host
    /// pipelines that take static pattern lists.
    pub fn batches(&self) -> &[Arc<PatternMatcher>] {
        &self.batches
    }
}

/// Owner of the live filter set. Readers take a snapshot and see either
/// the fully-old or the fully-new set.
pub struct PatternStore {
    current: ArcSwap<ActiveFilterSet>,
    next_epoch: AtomicU64,
    batch_size: usize,
}

impl PatternStore {
    /// A store holding only the core patterns.
    pub fn new(batch_size: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(ActiveFilterSet::build(0, vec![], batch_size)),
            next_epoch: AtomicU64::new(1),
            batch_size,
        }
    }

    pub fn snapshot(&self) -> Arc<ActiveFilterSet> {
        self.current.load_full()
    }

    pub fn get_active_patterns(&self) -> Vec<BlockPattern> {
        self.current.load().patterns().to_vec()
    }

    pub fn core_domains(&self) -> Vec<BlockPattern> {
        core_patterns()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Epoch number to stamp on the next built set.
    pub fn allocate_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Swaps in a new set. An older epoch never replaces a newer one.
    /// Returns the set that is active afterwards.
    pub fn replace(&self, set: Arc<ActiveFilterSet>) -> Arc<ActiveFilterSet> {
        let epoch = set.epoch();
        let previous = self.current.rcu(|current| {
            if current.epoch() > epoch {
                current.clone()
            } else {
                set.clone()
            }
        });
        if previous.epoch() > epoch {
            warn!(
                "Discarding filter set epoch {} (current is {})",
                epoch,
                previous.epoch()
            );
            return previous;
        }
        info!(
            "Active filter set replaced: epoch {} -> {} ({} patterns)",
            previous.epoch(),
            epoch,
            set.len()
        );
        set
    }

    /// Builds a set stamped with `epoch` and swaps it in. Callers that take
    /// a while to gather `groups` allocate the epoch before they start, so
    /// a refresh that began later always wins.
    pub fn install(&self, epoch: u64, groups: Vec<Vec<BlockPattern>>) -> Arc<ActiveFilterSet> {
        self.replace(Arc::new(ActiveFilterSet::build(
            epoch,
            groups,
            self.batch_size,
        )))
    }

    /// Builds a set from list pattern groups with a fresh epoch and swaps it in.
    pub fn replace_with(&self, groups: Vec<Vec<BlockPattern>>) -> Arc<ActiveFilterSet> {
        self.install(self.allocate_epoch(), groups)
    }
}
