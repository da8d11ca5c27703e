use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::info;

/// Per-browsing-context request counters.
#[derive(Debug)]
pub struct BlockStats {
    examined: AtomicU64,
    blocked: AtomicU64,
    // Blocked request count per request host
    by_domain: RwLock<FxHashMap<String, u64>>,
    started: RwLock<Instant>,
}

/// Point-in-time view of a [`BlockStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub runtime_minutes: u64,
    pub examined: u64,
    pub blocked: u64,
    /// Percentage of examined requests that were denied.
    pub block_rate: f64,
    pub top_domains: Vec<(String, u64)>,
}

impl BlockStats {
    pub fn new() -> Self {
        Self {
            examined: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            by_domain: RwLock::new(FxHashMap::default()),
            started: RwLock::new(Instant::now()),
        }
    }

    pub fn examined(&self) -> u64 {
        self.examined.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Records one classification decision. `examined` is bumped before
    /// `blocked`, so a reader never sees more blocks than examinations.
    pub fn record(&self, url: &str, denied: bool) {
        self.examined.fetch_add(1, Ordering::Relaxed);
        if denied {
            self.blocked.fetch_add(1, Ordering::Relaxed);
            let domain = extract_domain(url);
            let mut map = self.by_domain.write().unwrap_or_else(|e| e.into_inner());
            *map.entry(domain).or_insert(0) += 1;
        }
    }

    pub fn domain_count(&self, domain: &str) -> u64 {
        self.by_domain
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(domain)
            .copied()
            .unwrap_or(0)
    }

    /// Zeroes every counter and restarts the runtime clock.
    pub fn reset(&self) {
        self.blocked.store(0, Ordering::Relaxed);
        self.examined.store(0, Ordering::Relaxed);
        self.by_domain
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.started.write().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn report(&self, top_n: usize) -> StatsReport {
        let blocked = self.blocked();
        let examined = self.examined().max(blocked);
        let runtime = self
            .started
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed();

        let mut top_domains: Vec<(String, u64)> = self
            .by_domain
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(d, c)| (d.clone(), *c))
            .collect();
        // Highest count first, ties by name for stable output
        top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_domains.truncate(top_n);

        StatsReport {
            runtime_minutes: runtime.as_secs() / 60,
            examined,
            blocked,
            block_rate: if examined > 0 {
                (blocked as f64 / examined as f64) * 100.0
            } else {
                0.0
            },
            top_domains,
        }
    }
}

impl Default for BlockStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Host of a request URL, falling back to a naive split of the text
/// after `://` when the URL does not parse.
pub fn extract_domain(url: &str) -> String {
    if let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    {
        return host;
    }

    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        "unknown".to_string()
    } else {
        host.to_ascii_lowercase()
    }
}

/// [`BlockStats`] per browsing context.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    contexts: RwLock<FxHashMap<String, Arc<BlockStats>>>,
}

impl StatsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stats for `context`, created on first use.
    pub fn for_context(&self, context: &str) -> Arc<BlockStats> {
        if let Some(stats) = self
            .contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(context)
        {
            return stats.clone();
        }
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(context.to_string())
            .or_default()
            .clone()
    }

    pub fn contexts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn dump_stats(&self, top_n: usize) {
        for context in self.contexts() {
            let report = self.for_context(&context).report(top_n);
            let top = report
                .top_domains
                .iter()
                .map(|(d, c)| format!("[{}: {}]", d, c))
                .collect::<Vec<_>>()
                .join(" ");
            info!(
                "STATS [{}]: Runtime: {}m, Examined: {}, Blocked: {} ({:.1}%), Top: {}",
                context,
                report.runtime_minutes,
                report.examined,
                report.blocked,
                report.block_rate,
                if top.is_empty() { "-" } else { &top }
            );
        }
    }

    /// Logs every context's report on a fixed interval.
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration, top_n: usize) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.dump_stats(top_n);
            }
        })
    }
}
