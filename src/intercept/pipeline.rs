use super::types::{Decision, InterceptedRequest, MatcherRegistration, RegistrationId};
use crate::engine::CandidateUrl;
use crate::error::RegistrationError;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, trace};

/// The host's outbound-request hook, one set of registrations per
/// browsing context. Registrations are evaluated independently.
pub trait RequestPipeline: Send + Sync {
    /// Whether a [`UrlFilter::Live`](super::UrlFilter::Live) filter is
    /// re-evaluated per request. Pipelines that snapshot patterns at
    /// registration time return `false`.
    fn supports_live_patterns(&self) -> bool;

    fn register(
        &self,
        context: &str,
        registration: MatcherRegistration,
    ) -> Result<RegistrationId, RegistrationError>;

    /// Returns `false` if the id was not registered on `context`.
    fn unregister(&self, context: &str, id: RegistrationId) -> bool;
}

/// In-process pipeline: walks registrations in registration order and
/// stops at the first deny.
#[derive(Debug, Default)]
pub struct LocalPipeline {
    contexts: RwLock<FxHashMap<String, Vec<(RegistrationId, MatcherRegistration)>>>,
    next_id: AtomicU64,
}

impl LocalPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contexts(names: &[&str]) -> Self {
        let pipeline = Self::new();
        for name in names {
            pipeline.add_context(name);
        }
        pipeline
    }

    /// Makes a browsing context available for registration.
    pub fn add_context(&self, name: &str) {
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default();
    }

    pub fn registration_count(&self, context: &str) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(context)
            .map_or(0, Vec::len)
    }

    pub fn registration_names(&self, context: &str) -> Vec<String> {
        self.contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(context)
            .map(|regs| regs.iter().map(|(_, r)| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Classifies one request. Unknown contexts allow everything.
    pub fn dispatch(&self, request: &InterceptedRequest) -> Decision {
        let contexts = self.contexts.read().unwrap_or_else(|e| e.into_inner());
        let Some(registrations) = contexts.get(&request.context) else {
            return Decision::Allow;
        };

        let lower = request.url.to_ascii_lowercase();
        let parsed = CandidateUrl::parse(&request.url);

        for (_, registration) in registrations {
            let Some(rule) = registration.filter.find_match(&lower, parsed.as_ref()) else {
                continue;
            };
            if (registration.handler)(request, &rule).is_deny() {
                trace!("{} denied by '{}'", request.url, registration.name);
                return Decision::Deny;
            }
        }
        Decision::Allow
    }
}

impl RequestPipeline for LocalPipeline {
    fn supports_live_patterns(&self) -> bool {
        true
    }

    fn register(
        &self,
        context: &str,
        registration: MatcherRegistration,
    ) -> Result<RegistrationId, RegistrationError> {
        if registration.filter.is_empty() {
            return Err(RegistrationError::EmptyPatterns(registration.name));
        }

        let mut contexts = self.contexts.write().unwrap_or_else(|e| e.into_inner());
        let registrations = contexts
            .get_mut(context)
            .ok_or_else(|| RegistrationError::ContextUnavailable(context.to_string()))?;

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            "Registered '{}' on context '{}' as #{}",
            registration.name, context, id.0
        );
        registrations.push((id, registration));
        Ok(id)
    }

    fn unregister(&self, context: &str, id: RegistrationId) -> bool {
        let mut contexts = self.contexts.write().unwrap_or_else(|e| e.into_inner());
        let Some(registrations) = contexts.get_mut(context) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|(rid, _)| *rid != id);
        registrations.len() != before
    }
}
