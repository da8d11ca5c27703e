use std::collections::HashMap;
use std::sync::Arc;
use ytview::config::Config;
use ytview::engine::{BlockingToggle, FilterListManager, FilterManager, PatternStore};
use ytview::error::RegistrationError;
use ytview::intercept::{
    ContextPhase, Decision, InterceptedRequest, Layer, LocalPipeline, MatcherRegistration,
    NetworkInterceptor, RegistrationId, RequestPipeline,
};
use ytview::stats::StatsRegistry;

fn unreachable_config(cache_dir: &std::path::Path) -> Config {
    // Port 9 on localhost is closed in test environments
    let mut lists = HashMap::new();
    lists.insert("easylist".to_string(), "http://127.0.0.1:9/easylist.txt".to_string());
    lists.insert("easyprivacy".to_string(), "http://127.0.0.1:9/easyprivacy.txt".to_string());
    let mut config = Config {
        filter_lists: lists,
        ..Config::default()
    };
    config.filters.cache_dir = Some(cache_dir.to_path_buf());
    config
}

fn interceptor(pipeline: Arc<dyn RequestPipeline>, store: Arc<PatternStore>) -> (NetworkInterceptor, BlockingToggle, Arc<StatsRegistry>) {
    let toggle = BlockingToggle::default();
    let stats = StatsRegistry::new();
    let interceptor = NetworkInterceptor::new(pipeline, store, toggle.clone(), stats.clone(), None);
    (interceptor, toggle, stats)
}

#[tokio::test]
async fn test_core_domains_blocked_when_every_download_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = unreachable_config(dir.path());
    let store = Arc::new(PatternStore::new(config.filters.batch_size));
    let manager = FilterListManager::new(&config, dir.path(), store.clone()).unwrap();
    let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
    let (interceptor, _, stats) = interceptor(pipeline.clone(), store);

    interceptor.setup("default");
    let set = interceptor.refresh(&manager, true).await;
    assert!(!set.is_empty());

    let deny = |url: &str| pipeline.dispatch(&InterceptedRequest::new("default", url));
    assert_eq!(deny("https://ads.doubleclick.net/x"), Decision::Deny);
    assert_eq!(deny("https://pagead2.googlesyndication.com/pagead/show_ads.js"), Decision::Deny);
    assert_eq!(deny("https://www.youtube.com/api/stats/ads?ver=2"), Decision::Deny);
    assert_eq!(deny("https://www.youtube.com/watch?v=abc"), Decision::Allow);

    let stats = stats.for_context("default");
    assert_eq!(stats.blocked(), 3);
    assert!(stats.examined() >= stats.blocked());
}

#[tokio::test]
async fn test_list_patterns_apply_after_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let config = unreachable_config(dir.path());
    // A stale cache is still better than nothing
    std::fs::write(dir.path().join("easylist.txt"), "! comment\n||tracker.example^\n##.banner\n").unwrap();
    let store = Arc::new(PatternStore::new(config.filters.batch_size));
    let manager = FilterListManager::new(&config, dir.path(), store.clone()).unwrap();
    let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
    let (interceptor, toggle, _) = interceptor(pipeline.clone(), store.clone());

    interceptor.setup("default");
    let dispatch = |url: &str| pipeline.dispatch(&InterceptedRequest::new("default", url));
    assert_eq!(dispatch("https://cdn.tracker.example/p.gif"), Decision::Allow);

    manager.refresh(true).await;
    assert_eq!(dispatch("https://cdn.tracker.example/p.gif"), Decision::Deny);
    assert_eq!(dispatch("https://nottracker.example/p.gif"), Decision::Allow);

    // Disabling takes effect on the next request without re-registration
    let before = pipeline.registration_count("default");
    toggle.set_enabled(false);
    assert_eq!(dispatch("https://cdn.tracker.example/p.gif"), Decision::Allow);
    assert_eq!(dispatch("https://ads.doubleclick.net/x"), Decision::Allow);
    assert_eq!(pipeline.registration_count("default"), before);
}

/// A host that only accepts the minimal fallback matcher.
struct GrudgingPipeline(LocalPipeline);

impl RequestPipeline for GrudgingPipeline {
    fn supports_live_patterns(&self) -> bool {
        self.0.supports_live_patterns()
    }

    fn register(
        &self,
        context: &str,
        registration: MatcherRegistration,
    ) -> Result<RegistrationId, RegistrationError> {
        if registration.name != Layer::Fallback.name() {
            return Err(RegistrationError::Rejected {
                name: registration.name,
                reason: "quota exceeded".to_string(),
            });
        }
        self.0.register(context, registration)
    }

    fn unregister(&self, context: &str, id: RegistrationId) -> bool {
        self.0.unregister(context, id)
    }
}

#[tokio::test]
async fn test_fallback_installed_when_all_layers_fail() {
    let pipeline = Arc::new(GrudgingPipeline(LocalPipeline::with_contexts(&["persist:ytview"])));
    let store = Arc::new(PatternStore::new(500));
    let (interceptor, _, _) = interceptor(pipeline.clone(), store);

    let report = interceptor.setup("persist:ytview");
    assert!(report.fallback_installed);
    assert_eq!(report.failed.len(), 4);
    assert_eq!(report.registered, vec![Layer::Fallback]);
    assert_eq!(interceptor.phase("persist:ytview"), ContextPhase::Active);

    let dispatch = |url: &str| pipeline.0.dispatch(&InterceptedRequest::new("persist:ytview", url));
    assert_eq!(dispatch("https://securepubads.doubleclick.net/gampad/ads"), Decision::Deny);
    assert_eq!(dispatch("https://www.youtube.com/api/stats/ads?x=1"), Decision::Deny);
    assert_eq!(dispatch("https://www.google-analytics.com/collect"), Decision::Allow);
}

#[tokio::test]
async fn test_contexts_are_independent() {
    let pipeline = Arc::new(LocalPipeline::with_contexts(&["default", "persist:ytview"]));
    let store = Arc::new(PatternStore::new(500));
    let (interceptor, _, stats) = interceptor(pipeline.clone(), store);

    interceptor.setup("default");
    assert_eq!(interceptor.phase("persist:ytview"), ContextPhase::Unregistered);
    assert_eq!(
        pipeline.dispatch(&InterceptedRequest::new("persist:ytview", "https://ads.doubleclick.net/x")),
        Decision::Allow
    );

    interceptor.setup("persist:ytview");
    pipeline.dispatch(&InterceptedRequest::new("persist:ytview", "https://ads.doubleclick.net/x"));
    assert_eq!(stats.for_context("persist:ytview").blocked(), 1);
    assert_eq!(stats.for_context("default").blocked(), 0);
}
