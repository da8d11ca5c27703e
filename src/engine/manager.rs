use super::fetcher::{FilterList, ListFetcher};
use super::pattern::BlockPattern;
use super::store::{ActiveFilterSet, PatternStore};
use super::traits::{FilterManager, ListSource};
use crate::config::Config;
use anyhow::Result;
use futures::{stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fetches, parses and merges every configured filter list into the
/// shared [`PatternStore`].
pub struct FilterListManager {
    lists: Vec<FilterList>,
    source: Arc<dyn ListSource>,
    store: Arc<PatternStore>,
    concurrency: usize,
}

impl FilterListManager {
    pub fn new(config: &Config, cache_dir: &Path, store: Arc<PatternStore>) -> Result<Self> {
        let fetcher = ListFetcher::new(
            &config.filters.user_agent,
            Duration::from_secs(config.filters.max_age_days * 86_400),
        )?;
        Ok(Self::with_source(config, cache_dir, store, Arc::new(fetcher)))
    }

    /// A manager reading its lists through `source` instead of HTTP.
    pub fn with_source(
        config: &Config,
        cache_dir: &Path,
        store: Arc<PatternStore>,
        source: Arc<dyn ListSource>,
    ) -> Self {
        // Sorted so list order (and therefore merge order) is deterministic
        let lists = config
            .get_filter_lists_sorted()
            .into_iter()
            .map(|(name, url)| FilterList::new(name, url, cache_dir))
            .collect();

        Self {
            lists,
            source,
            store,
            concurrency: config.filters.concurrent_downloads.max(1),
        }
    }

    pub fn lists(&self) -> &[FilterList] {
        &self.lists
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Fetch then parse a single list. A download failure falls back to
    /// whatever cache exists; a read failure drops the list for this cycle.
    async fn load_list(&self, list: &FilterList, force: bool) -> Vec<BlockPattern> {
        if let Err(e) = self.source.fetch(list, force).await {
            warn!(
                "Fetch of '{}' failed, using cached copy if any: {}",
                list.name, e
            );
        }

        match self.source.parse(list).await {
            Ok(patterns) => patterns,
            Err(e) => {
                error!("Skipping filter list '{}': {}", list.name, e);
                vec![]
            }
        }
    }
}

#[async_trait::async_trait]
impl FilterManager for FilterListManager {
    async fn refresh(&self, force: bool) -> Arc<ActiveFilterSet> {
        info!(
            "Refreshing {} filter lists{}...",
            self.lists.len(),
            if force { " (forced)" } else { "" }
        );

        // Taken before any download so a refresh started later wins
        let epoch = self.store.allocate_epoch();

        // `buffered` keeps results in list order while still downloading
        // up to `concurrency` lists at once
        let loads: Vec<_> = self
            .lists
            .iter()
            .map(|list| self.load_list(list, force))
            .collect();
        let groups: Vec<Vec<BlockPattern>> = stream::iter(loads)
            .buffered(self.concurrency)
            .collect()
            .await;

        let raw: usize = groups.iter().map(Vec::len).sum();
        let set = self.store.install(epoch, groups);
        info!(
            "Filter refresh complete. Active patterns: {} (from {} list entries)",
            set.len(),
            raw
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pattern::CandidateUrl;
    use crate::engine::store::CORE_PATTERNS;
    use crate::engine::traits::UrlMatcher;
    use crate::error::FilterError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_with(lists: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        config.filter_lists = lists
            .iter()
            .map(|(n, u)| (n.to_string(), u.to_string()))
            .collect::<HashMap<_, _>>();
        config
    }

    #[tokio::test]
    async fn test_unreachable_lists_keep_core_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&[("a", "http://127.0.0.1:1/a.txt"), ("b", "http://127.0.0.1:1/b.txt")]);
        let store = Arc::new(PatternStore::new(500));
        let manager = FilterListManager::new(&config, dir.path(), store.clone()).unwrap();

        let set = manager.refresh(false).await;
        assert_eq!(set.len(), CORE_PATTERNS.len());
        let url = CandidateUrl::parse("https://pubads.g.doubleclick.net/gampad/ads").unwrap();
        assert!(store.snapshot().matcher().check(&url).is_some());
    }

    #[tokio::test]
    async fn test_stale_cache_used_when_fetch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&[("cached", "http://127.0.0.1:1/list.txt")]);
        let store = Arc::new(PatternStore::new(500));
        let manager = FilterListManager::new(&config, dir.path(), store).unwrap();

        std::fs::write(dir.path().join("cached.txt"), "||cached-tracker.com^\n").unwrap();
        let old = std::time::SystemTime::now() - Duration::from_secs(30 * 86_400);
        filetime::set_file_mtime(
            dir.path().join("cached.txt"),
            filetime::FileTime::from_system_time(old),
        )
        .unwrap();

        let set = manager.refresh(true).await;
        assert_eq!(set.len(), CORE_PATTERNS.len() + 1);
        assert_eq!(manager.lists()[0].status().pattern_count, 1);
    }

    /// Serves one host per parse call; the first parse is slow.
    struct SlowFirstSource {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ListSource for SlowFirstSource {
        async fn fetch(&self, _list: &FilterList, _force: bool) -> Result<bool, FilterError> {
            Ok(true)
        }

        async fn parse(&self, _list: &FilterList) -> Result<Vec<BlockPattern>, FilterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == 1 {
                tokio::time::sleep(self.delay).await;
            }
            let glob = format!("*://*.gen{}.com/*", call);
            Ok(BlockPattern::parse(&glob).into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_later_refresh_wins_over_slower_earlier_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&[("only", "http://127.0.0.1:1/only.txt")]);
        let store = Arc::new(PatternStore::new(500));
        let source = Arc::new(SlowFirstSource {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(300),
        });
        let manager = Arc::new(FilterListManager::with_source(
            &config,
            dir.path(),
            store.clone(),
            source,
        ));

        let periodic = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh(false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let forced = manager.refresh(true).await;
        let periodic = periodic.await.unwrap();

        let gen1 = CandidateUrl::parse("https://x.gen1.com/").unwrap();
        let gen2 = CandidateUrl::parse("https://x.gen2.com/").unwrap();
        let active = store.snapshot();
        assert!(active.matcher().check(&gen2).is_some());
        assert!(active.matcher().check(&gen1).is_none());
        // The slow refresh reports the set that actually won
        assert_eq!(periodic.epoch(), forced.epoch());
        assert_eq!(active.epoch(), forced.epoch());
    }
}
