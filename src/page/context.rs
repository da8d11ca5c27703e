use crate::api::types::{BrandingData, DislikeData, SponsorSegment};
use crate::settings::FeatureSettings;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// What the page knows about the video being watched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoContext {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub sponsor_segments: Vec<SponsorSegment>,
    pub branding: Option<BrandingData>,
    pub dislikes: Option<DislikeData>,
}

impl VideoContext {
    pub fn new(video_id: &str, title: &str, url: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContext {
    pub settings: FeatureSettings,
    pub video: Option<VideoContext>,
}

/// The page's single source of settings and video data. Readers take a
/// snapshot per callback; writers go through [`SharedPageContext::update`].
#[derive(Debug)]
pub struct SharedPageContext {
    inner: ArcSwap<PageContext>,
}

impl SharedPageContext {
    pub fn new(settings: FeatureSettings) -> Self {
        Self {
            inner: ArcSwap::from_pointee(PageContext {
                settings,
                video: None,
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<PageContext> {
        self.inner.load_full()
    }

    /// Applies `f` to a copy of the current context and swaps it in.
    /// `f` may run more than once under contention.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&mut PageContext),
    {
        self.inner.rcu(|current| {
            let mut next = PageContext::clone(current);
            f(&mut next);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let shared = SharedPageContext::new(FeatureSettings::default());
        let before = shared.snapshot();
        shared.update(|ctx| {
            ctx.settings.dearrow_enabled = false;
            ctx.video = Some(VideoContext::new("abc", "Title", "https://www.youtube.com/watch?v=abc"));
        });
        assert!(before.settings.dearrow_enabled);
        assert!(before.video.is_none());

        let after = shared.snapshot();
        assert!(!after.settings.dearrow_enabled);
        assert_eq!(after.video.as_ref().map(|v| v.video_id.as_str()), Some("abc"));
    }
}
