use super::layers::{self, FALLBACK_PATTERNS, KEYWORD_PREFILTER, SITE_ENDPOINTS};
use super::pipeline::RequestPipeline;
use super::types::{
    Decision, InterceptedRequest, Layer, MatcherRegistration, RegistrationId, RequestHandler,
    UrlFilter,
};
use crate::engine::store::core_patterns;
use crate::engine::{ActiveFilterSet, BlockingToggle, FilterManager, PatternMatcher, PatternStore};
use crate::error::RegistrationError;
use crate::logger::{RequestLogAction, RequestLogEntry, RequestLogger};
use crate::stats::{extract_domain, BlockStats, StatsRegistry};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Registration state of one browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    Unregistered,
    Registering,
    Active,
}

/// Outcome of [`NetworkInterceptor::setup`].
#[derive(Debug, Default)]
pub struct SetupReport {
    pub registered: Vec<Layer>,
    pub failed: Vec<(Layer, RegistrationError)>,
    pub fallback_installed: bool,
}

#[derive(Debug)]
struct ContextState {
    phase: ContextPhase,
    registrations: Vec<(Layer, RegistrationId)>,
}

impl ContextState {
    fn unregistered() -> Self {
        Self {
            phase: ContextPhase::Unregistered,
            registrations: Vec::new(),
        }
    }
}

/// Registers the layered block matchers on browsing contexts and keeps
/// their pattern-set registrations in step with the [`PatternStore`].
pub struct NetworkInterceptor {
    pipeline: Arc<dyn RequestPipeline>,
    store: Arc<PatternStore>,
    toggle: BlockingToggle,
    stats: Arc<StatsRegistry>,
    logger: Option<Arc<RequestLogger>>,
    core: Arc<PatternMatcher>,
    site: Arc<PatternMatcher>,
    contexts: Mutex<FxHashMap<String, ContextState>>,
}

impl NetworkInterceptor {
    pub fn new(
        pipeline: Arc<dyn RequestPipeline>,
        store: Arc<PatternStore>,
        toggle: BlockingToggle,
        stats: Arc<StatsRegistry>,
        logger: Option<Arc<RequestLogger>>,
    ) -> Self {
        Self {
            pipeline,
            store,
            toggle,
            stats,
            logger,
            core: Arc::new(PatternMatcher::new(core_patterns())),
            site: layers::matcher_for(SITE_ENDPOINTS),
            contexts: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn toggle(&self) -> &BlockingToggle {
        &self.toggle
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn stats(&self, context: &str) -> Arc<BlockStats> {
        self.stats.for_context(context)
    }

    pub fn phase(&self, context: &str) -> ContextPhase {
        self.lock_contexts()
            .get(context)
            .map_or(ContextPhase::Unregistered, |s| s.phase)
    }

    fn lock_contexts(&self) -> std::sync::MutexGuard<'_, FxHashMap<String, ContextState>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers every layer on `context`, replacing any previous
    /// registrations. A layer that fails to register is logged and
    /// skipped; if none succeed the fallback layer is installed.
    pub fn setup(&self, context: &str) -> SetupReport {
        let mut contexts = self.lock_contexts();
        let state = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::unregistered);

        for (_, id) in state.registrations.drain(..) {
            self.pipeline.unregister(context, id);
        }
        state.phase = ContextPhase::Registering;
        self.stats.for_context(context).reset();

        info!("Setting up network blocking on context '{}'", context);
        let mut report = SetupReport::default();

        let attempts = [
            (
                Layer::Core,
                self.register_static(context, Layer::Core, self.core.clone()),
            ),
            (
                Layer::SiteSpecific,
                self.register_static(context, Layer::SiteSpecific, self.site.clone()),
            ),
            (
                Layer::PatternSet,
                self.register_pattern_set(context, &self.store.snapshot()),
            ),
            (Layer::Keyword, self.register_keyword(context)),
        ];
        for (layer, result) in attempts {
            absorb(context, state, &mut report, layer, result);
        }

        if report.registered.is_empty() {
            warn!(
                "No blocking layer could be registered on '{}', installing fallback",
                context
            );
            let result = self.register_static(
                context,
                Layer::Fallback,
                layers::matcher_for(FALLBACK_PATTERNS),
            );
            absorb(context, state, &mut report, Layer::Fallback, result);
            report.fallback_installed = report.registered.contains(&Layer::Fallback);
        }

        state.phase = ContextPhase::Active;
        info!(
            "Network blocking on '{}': {} layer(s) active ({})",
            context,
            report.registered.len(),
            report
                .registered
                .iter()
                .map(|l| l.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        report
    }

    /// Removes every registration from `context`.
    pub fn teardown(&self, context: &str) {
        let mut contexts = self.lock_contexts();
        if let Some(state) = contexts.get_mut(context) {
            for (_, id) in state.registrations.drain(..) {
                self.pipeline.unregister(context, id);
            }
            state.phase = ContextPhase::Unregistered;
            info!("Network blocking removed from '{}'", context);
        }
    }

    /// Refreshes the filter lists through `manager` and brings every
    /// active context up to date with the new set.
    pub async fn refresh(&self, manager: &dyn FilterManager, force: bool) -> Arc<ActiveFilterSet> {
        let set = manager.refresh(force).await;
        self.apply_filter_set(&set);
        set
    }

    /// Re-registers the pattern-set layer with `set` on every active
    /// context. A no-op for pipelines that read the store live.
    pub fn apply_filter_set(&self, set: &ActiveFilterSet) {
        if self.pipeline.supports_live_patterns() {
            return;
        }

        let mut contexts = self.lock_contexts();
        for (context, state) in contexts.iter_mut() {
            if state.phase != ContextPhase::Active {
                continue;
            }
            // New batches first so there is no window without list coverage
            let new_ids = match self.register_pattern_set(context, set) {
                Ok(ids) => ids,
                Err(e) => {
                    error!(
                        "Keeping previous pattern set on '{}', re-registration failed: {}",
                        context, e
                    );
                    continue;
                }
            };

            let (old, kept): (Vec<_>, Vec<_>) = state
                .registrations
                .drain(..)
                .partition(|(layer, _)| *layer == Layer::PatternSet);
            for (_, id) in old {
                self.pipeline.unregister(context, id);
            }
            state.registrations = kept;
            state
                .registrations
                .extend(new_ids.into_iter().map(|id| (Layer::PatternSet, id)));
            info!(
                "Re-registered pattern set epoch {} on '{}' ({} batches)",
                set.epoch(),
                context,
                set.batches().len()
            );
        }
    }

    fn register_static(
        &self,
        context: &str,
        layer: Layer,
        matcher: Arc<PatternMatcher>,
    ) -> Result<Vec<RegistrationId>, RegistrationError> {
        let id = self.pipeline.register(
            context,
            MatcherRegistration {
                name: layer.name().to_string(),
                filter: UrlFilter::Static(matcher),
                handler: self.deny_handler(context, layer),
            },
        )?;
        Ok(vec![id])
    }

    fn register_pattern_set(
        &self,
        context: &str,
        set: &ActiveFilterSet,
    ) -> Result<Vec<RegistrationId>, RegistrationError> {
        let layer = Layer::PatternSet;
        if self.pipeline.supports_live_patterns() {
            let id = self.pipeline.register(
                context,
                MatcherRegistration {
                    name: layer.name().to_string(),
                    filter: UrlFilter::Live(self.store.clone()),
                    handler: self.deny_handler(context, layer),
                },
            )?;
            return Ok(vec![id]);
        }

        let mut ids = Vec::with_capacity(set.batches().len());
        for (idx, batch) in set.batches().iter().enumerate() {
            let registration = MatcherRegistration {
                name: format!("{}#{}", layer.name(), idx + 1),
                filter: UrlFilter::Static(batch.clone()),
                handler: self.deny_handler(context, layer),
            };
            match self.pipeline.register(context, registration) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    // All batches or none, so a refresh never leaves a partial set
                    for id in ids {
                        self.pipeline.unregister(context, id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    fn register_keyword(&self, context: &str) -> Result<Vec<RegistrationId>, RegistrationError> {
        let layer = Layer::Keyword;
        let toggle = self.toggle.clone();
        let recorder = self.recorder(context, layer);
        let handler: RequestHandler = Arc::new(move |request: &InterceptedRequest, _: &str| {
            let marker = if toggle.is_enabled() {
                layers::keyword_marker(&request.url.to_ascii_lowercase())
            } else {
                None
            };
            recorder.record(request, marker)
        });

        let id = self.pipeline.register(
            context,
            MatcherRegistration {
                name: layer.name().to_string(),
                filter: UrlFilter::Substrings(KEYWORD_PREFILTER),
                handler,
            },
        )?;
        Ok(vec![id])
    }

    /// Handler that denies everything its filter selected while blocking
    /// is enabled.
    fn deny_handler(&self, context: &str, layer: Layer) -> RequestHandler {
        let toggle = self.toggle.clone();
        let recorder = self.recorder(context, layer);
        Arc::new(move |request: &InterceptedRequest, rule: &str| {
            let rule = toggle.is_enabled().then_some(rule);
            recorder.record(request, rule)
        })
    }

    fn recorder(&self, context: &str, layer: Layer) -> DecisionRecorder {
        DecisionRecorder {
            context: context.to_string(),
            layer,
            stats: self.stats.for_context(context),
            logger: self.logger.clone(),
        }
    }
}

fn absorb(
    context: &str,
    state: &mut ContextState,
    report: &mut SetupReport,
    layer: Layer,
    result: Result<Vec<RegistrationId>, RegistrationError>,
) {
    match result {
        Ok(ids) => {
            state
                .registrations
                .extend(ids.into_iter().map(|id| (layer, id)));
            report.registered.push(layer);
        }
        Err(e) => {
            error!("Failed to register {} layer on '{}': {}", layer, context, e);
            report.failed.push((layer, e));
        }
    }
}

/// Counts and logs the decisions of one layer on one context.
struct DecisionRecorder {
    context: String,
    layer: Layer,
    stats: Arc<BlockStats>,
    logger: Option<Arc<RequestLogger>>,
}

impl DecisionRecorder {
    /// `Some(rule)` denies, `None` allows.
    fn record(&self, request: &InterceptedRequest, deny_rule: Option<&str>) -> Decision {
        let decision = if deny_rule.is_some() {
            Decision::Deny
        } else {
            Decision::Allow
        };
        self.stats.record(&request.url, decision.is_deny());

        if let Some(logger) = &self.logger {
            let action = match decision {
                Decision::Deny => RequestLogAction::Blocked,
                Decision::Allow => RequestLogAction::Allowed,
            };
            if logger.wants(action) {
                logger.log(RequestLogEntry {
                    context: self.context.clone(),
                    url: request.url.clone(),
                    domain: extract_domain(&request.url),
                    action,
                    layer: self.layer.name().to_string(),
                    rule: deny_rule.map(str::to_string),
                });
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BlockPattern;
    use crate::intercept::LocalPipeline;

    fn setup(pipeline: Arc<dyn RequestPipeline>) -> (NetworkInterceptor, BlockingToggle) {
        let toggle = BlockingToggle::default();
        let interceptor = NetworkInterceptor::new(
            pipeline,
            Arc::new(PatternStore::new(500)),
            toggle.clone(),
            StatsRegistry::new(),
            None,
        );
        (interceptor, toggle)
    }

    /// A pipeline that snapshots patterns at registration time.
    struct StaticPipeline(LocalPipeline);

    impl RequestPipeline for StaticPipeline {
        fn supports_live_patterns(&self) -> bool {
            false
        }
        fn register(
            &self,
            context: &str,
            registration: MatcherRegistration,
        ) -> Result<RegistrationId, RegistrationError> {
            self.0.register(context, registration)
        }
        fn unregister(&self, context: &str, id: RegistrationId) -> bool {
            self.0.unregister(context, id)
        }
    }

    #[test]
    fn test_layers_and_toggle() {
        let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
        let (interceptor, toggle) = setup(pipeline.clone());
        let report = interceptor.setup("default");
        assert_eq!(
            report.registered,
            vec![Layer::Core, Layer::SiteSpecific, Layer::PatternSet, Layer::Keyword]
        );
        assert!(!report.fallback_installed);
        assert_eq!(interceptor.phase("default"), ContextPhase::Active);

        let ad = InterceptedRequest::new("default", "https://securepubads.g.doubleclick.net/tag/js/gpt.js");
        let keyword = InterceptedRequest::new("default", "https://cdn.example.org/ads/banner.png");
        let plain = InterceptedRequest::new("default", "https://www.youtube.com/watch?v=abc");

        assert_eq!(pipeline.dispatch(&ad), Decision::Deny);
        assert_eq!(pipeline.dispatch(&keyword), Decision::Deny);
        assert_eq!(pipeline.dispatch(&plain), Decision::Allow);

        toggle.set_enabled(false);
        assert_eq!(pipeline.dispatch(&ad), Decision::Allow);
        assert_eq!(pipeline.dispatch(&keyword), Decision::Allow);

        let stats = interceptor.stats("default");
        assert_eq!(stats.blocked(), 2);
        assert!(stats.examined() >= stats.blocked());
    }

    #[test]
    fn test_setup_resets_stats_and_replaces_registrations() {
        let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
        let (interceptor, _) = setup(pipeline.clone());
        interceptor.setup("default");
        let count = pipeline.registration_count("default");
        pipeline.dispatch(&InterceptedRequest::new("default", "https://ad.youtube.com/x"));
        assert_eq!(interceptor.stats("default").blocked(), 1);

        interceptor.setup("default");
        assert_eq!(pipeline.registration_count("default"), count);
        assert_eq!(interceptor.stats("default").blocked(), 0);
    }

    #[test]
    fn test_static_pipeline_reregisters_on_new_set() {
        let pipeline = Arc::new(StaticPipeline(LocalPipeline::with_contexts(&["default"])));
        let (interceptor, _) = setup(pipeline.clone());
        interceptor.setup("default");

        let url = InterceptedRequest::new("default", "https://x.new-tracker.io/p");
        assert_eq!(pipeline.0.dispatch(&url), Decision::Allow);

        let set = interceptor
            .store()
            .replace_with(vec![vec![BlockPattern::parse("*://*.new-tracker.io/*").unwrap()]]);
        // Not visible until re-registered
        assert_eq!(pipeline.0.dispatch(&url), Decision::Allow);

        interceptor.apply_filter_set(&set);
        assert_eq!(pipeline.0.dispatch(&url), Decision::Deny);
        let batches = pipeline
            .0
            .registration_names("default")
            .iter()
            .filter(|n| n.starts_with("patterns#"))
            .count();
        assert_eq!(batches, set.batches().len());
    }

    #[test]
    fn test_live_pipeline_sees_new_set_without_reregistering() {
        let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
        let (interceptor, _) = setup(pipeline.clone());
        interceptor.setup("default");
        let before = pipeline.registration_names("default");

        interceptor
            .store()
            .replace_with(vec![vec![BlockPattern::parse("*://*.new-tracker.io/*").unwrap()]]);
        let url = InterceptedRequest::new("default", "https://x.new-tracker.io/p");
        assert_eq!(pipeline.dispatch(&url), Decision::Deny);
        assert_eq!(pipeline.registration_names("default"), before);
    }

    #[test]
    fn test_teardown() {
        let pipeline = Arc::new(LocalPipeline::with_contexts(&["default"]));
        let (interceptor, _) = setup(pipeline.clone());
        interceptor.setup("default");
        interceptor.teardown("default");
        assert_eq!(pipeline.registration_count("default"), 0);
        assert_eq!(interceptor.phase("default"), ContextPhase::Unregistered);
    }
}
