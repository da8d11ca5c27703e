//! Optional page features driven by per-video data from the host.

mod branding;
mod dislike;
mod sponsor;

pub use branding::{BrandingOverride, THUMBNAIL_SELECTOR, TITLE_SELECTOR};
pub use dislike::{format_count, DislikeCounter, COUNTER_CLASS, DISLIKE_BUTTON};
pub use sponsor::{SponsorSkipper, NOTIFICATION_ID, NOTIFICATION_TTL};

use super::context::PageContext;
use super::dom::PageDom;
use super::gate::Trigger;
use crate::settings::FeatureSettings;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    SponsorSkip,
    Branding,
    Dislikes,
}

impl FeatureKind {
    pub fn enabled(self, settings: &FeatureSettings) -> bool {
        match self {
            FeatureKind::SponsorSkip => settings.sponsor_block_enabled,
            FeatureKind::Branding => settings.dearrow_enabled,
            FeatureKind::Dislikes => settings.return_dislike_enabled,
        }
    }
}

/// A feature that overlays the page from the data in [`PageContext`].
///
/// `apply` must be idempotent and a no-op without data. `cleanup` undoes
/// everything the feature injected and drops its cached state; it must be
/// safe to call repeatedly and while disabled.
pub trait Coordinator: Send {
    fn kind(&self) -> FeatureKind;
    fn apply(&mut self, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant);
    fn cleanup(&mut self, dom: &mut dyn PageDom);
    fn on_trigger(&mut self, _trigger: &Trigger, _dom: &mut dyn PageDom, _ctx: &PageContext, _now: Instant) {}
}

/// The page's coordinators, gated on their settings flags.
#[derive(Debug, Default)]
pub struct FeatureSet {
    sponsor: SponsorSkipper,
    branding: BrandingOverride,
    dislikes: DislikeCounter,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn all_mut(&mut self) -> [&mut dyn Coordinator; 3] {
        [&mut self.sponsor, &mut self.branding, &mut self.dislikes]
    }

    /// Re-applies one feature after its data changed.
    pub fn refresh(&mut self, kind: FeatureKind, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        if !kind.enabled(&ctx.settings) {
            return;
        }
        for feature in self.all_mut() {
            if feature.kind() == kind {
                feature.apply(dom, ctx, now);
            }
        }
    }

    pub fn apply_enabled(&mut self, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        for feature in self.all_mut() {
            if feature.kind().enabled(&ctx.settings) {
                feature.apply(dom, ctx, now);
            }
        }
    }

    /// Enabling a feature applies it, disabling cleans it up.
    pub fn settings_changed(
        &mut self,
        before: &FeatureSettings,
        dom: &mut dyn PageDom,
        ctx: &PageContext,
        now: Instant,
    ) {
        for feature in self.all_mut() {
            let kind = feature.kind();
            match (kind.enabled(before), kind.enabled(&ctx.settings)) {
                (false, true) => {
                    debug!("{:?} enabled", kind);
                    feature.apply(dom, ctx, now);
                }
                (true, false) => {
                    debug!("{:?} disabled", kind);
                    feature.cleanup(dom);
                }
                _ => {}
            }
        }
    }

    pub fn on_trigger(&mut self, trigger: &Trigger, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        for feature in self.all_mut() {
            if feature.kind().enabled(&ctx.settings) {
                feature.on_trigger(trigger, dom, ctx, now);
            }
        }
    }

    pub fn cleanup_all(&mut self, dom: &mut dyn PageDom) {
        for feature in self.all_mut() {
            feature.cleanup(dom);
        }
    }
}
