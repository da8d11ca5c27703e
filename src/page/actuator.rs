//! Reversible page mutations applied for the duration of an ad episode.

use super::dom::{NodeId, PageDom};
use super::signals::{AdSignalSet, SKIP_BUTTON, VIDEO};
use crate::config::ClassifierConfig;
use std::time::Instant;
use tracing::{debug, info};

pub const BANNER_ID: &str = "ytview-ad-banner";
pub const BANNER_TIMER_ID: &str = "ytview-ad-timer";

const HIDE_OVERRIDES: [(&str, &str); 4] = [
    ("visibility", "hidden"),
    ("position", "absolute"),
    ("width", "1px"),
    ("height", "1px"),
];

/// What the actuator changed on one media element, so that exactly that
/// can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOverrides {
    pub node: NodeId,
    pub properties: Vec<&'static str>,
    pub muted_by_us: bool,
    pub paused_by_us: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipAction {
    Clicked,
    SeekedToEnd,
    None,
}

#[derive(Debug)]
pub struct MitigationActuator {
    config: ClassifierConfig,
    applied: Option<AppliedOverrides>,
    banner: Option<NodeId>,
    episode_started: Option<Instant>,
}

impl MitigationActuator {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            applied: None,
            banner: None,
            episode_started: None,
        }
    }

    pub fn applied(&self) -> Option<&AppliedOverrides> {
        self.applied.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.applied.is_some() || self.banner.is_some()
    }

    /// No-ad to ad: hide, mute and pause the video, show the banner, then
    /// try to get past the ad.
    pub fn on_ad_started(&mut self, dom: &mut dyn PageDom, signals: &AdSignalSet, now: Instant) -> SkipAction {
        self.episode_started = Some(now);
        self.hide_video(dom);
        self.show_banner(dom, now);
        let action = self.try_skip(dom, signals);
        info!("Ad detected, skip action: {:?}", action);
        action
    }

    /// Ad still showing: refresh the timer and re-assert the hide, which the
    /// host page may have undone or moved to a fresh media element.
    pub fn on_still_in_ad(&mut self, dom: &mut dyn PageDom, now: Instant) {
        self.reassert_hide(dom);
        self.show_banner(dom, now);
    }

    /// Clears every override this actuator applied and removes the banner.
    /// Safe to call any number of times.
    pub fn restore(&mut self, dom: &mut dyn PageDom) {
        if let Some(applied) = self.applied.take() {
            release(dom, &applied);
        }
        if let Some(banner) = self.banner.take() {
            dom.remove(banner);
        }
        for stray in dom.query_all(&format!("#{}", BANNER_ID)) {
            dom.remove(stray);
        }
        if self.episode_started.take().is_some() {
            debug!("Ad mitigation restored");
        }
    }

    fn reassert_hide(&mut self, dom: &mut dyn PageDom) {
        let Some(video) = dom.query(VIDEO) else {
            return;
        };
        match self.applied.take() {
            Some(applied) if applied.node == video => {
                for (property, value) in HIDE_OVERRIDES {
                    if dom.style(video, property).as_deref() != Some(value) {
                        debug!("Video {} lost '{}' override, re-applying", video, property);
                        dom.set_style(video, property, value);
                    }
                }
                self.applied = Some(applied);
            }
            previous => {
                if let Some(previous) = previous {
                    debug!("Video {} replaced by {} during ad", previous.node, video);
                    release(dom, &previous);
                }
                self.hide_video(dom);
            }
        }
    }

    fn hide_video(&mut self, dom: &mut dyn PageDom) {
        let Some(video) = dom.query(VIDEO) else {
            return;
        };
        for (property, value) in HIDE_OVERRIDES {
            dom.set_style(video, property, value);
        }
        let muted_by_us = !dom.muted(video);
        if muted_by_us {
            dom.set_muted(video, true);
        }
        let paused_by_us = !dom.paused(video);
        if paused_by_us {
            dom.pause(video);
        }
        self.applied = Some(AppliedOverrides {
            node: video,
            properties: HIDE_OVERRIDES.iter().map(|(p, _)| *p).collect(),
            muted_by_us,
            paused_by_us,
        });
    }

    fn show_banner(&mut self, dom: &mut dyn PageDom, now: Instant) {
        let banner = match self.banner.filter(|b| dom.contains(*b)) {
            Some(banner) => banner,
            None => {
                let Some(body) = dom.body() else {
                    return;
                };
                let banner = dom.create_element("div", Some(BANNER_ID), Some(BANNER_ID));
                dom.set_text(banner, "YTView: Ad detected");
                let timer = dom.create_element("span", Some(BANNER_TIMER_ID), None);
                dom.append_child(banner, timer);
                dom.append_child(body, banner);
                self.banner = Some(banner);
                banner
            }
        };
        let elapsed = self
            .episode_started
            .map(|start| now.saturating_duration_since(start).as_secs())
            .unwrap_or_default();
        if let Some(timer) = dom
            .query_all(&format!("#{}", BANNER_TIMER_ID))
            .into_iter()
            .find(|t| dom.contains(*t))
        {
            dom.set_text(timer, &elapsed.to_string());
        }
        debug!("Ad banner {} at {}s", banner, elapsed);
    }

    fn try_skip(&mut self, dom: &mut dyn PageDom, signals: &AdSignalSet) -> SkipAction {
        if let Some(button) = dom.query(SKIP_BUTTON) {
            if dom.click(button) {
                return SkipAction::Clicked;
            }
        }
        let Some(video) = dom.query(VIDEO) else {
            return SkipAction::None;
        };
        let Some(duration) = dom.duration(video).or(signals.duration) else {
            return SkipAction::None;
        };
        if duration >= self.config.short_ad_max_secs || !signals.remaining_text_present {
            return SkipAction::None;
        }
        dom.set_current_time(video, (duration - self.config.seek_epsilon_secs).max(0.0));
        dom.play(video);
        if let Some(applied) = self.applied.as_mut().filter(|a| a.node == video) {
            applied.paused_by_us = false;
        }
        SkipAction::SeekedToEnd
    }
}

/// Undoes exactly what `applied` records, if its element is still there.
fn release(dom: &mut dyn PageDom, applied: &AppliedOverrides) {
    if !dom.contains(applied.node) {
        debug!("Video {} left the page before restore", applied.node);
        return;
    }
    for property in &applied.properties {
        dom.remove_style(applied.node, property);
    }
    if applied.muted_by_us {
        dom.set_muted(applied.node, false);
    }
    if applied.paused_by_us {
        dom.play(applied.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::{MediaState, MemoryPage};

    fn ad_page(duration: f64) -> (MemoryPage, NodeId) {
        let mut page = MemoryPage::new("https://www.youtube.com/watch?v=abc");
        let body = page.root();
        let player = page.add(body, "div", Some("movie_player"), &["ad-showing"]);
        page.add(player, "div", None, &["ytp-ad-duration-remaining"]);
        let video = page.add_video(player, MediaState::playing(duration));
        (page, video)
    }

    fn signals(page: &MemoryPage) -> AdSignalSet {
        AdSignalSet::sample(page)
    }

    #[test]
    fn test_ad_start_hides_mutes_and_banners() {
        let (mut page, video) = ad_page(120.0);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        let action = actuator.on_ad_started(&mut page, &s, Instant::now());

        assert_eq!(action, SkipAction::None);
        assert_eq!(page.style(video, "visibility").as_deref(), Some("hidden"));
        assert!(page.muted(video));
        assert!(page.paused(video));
        assert_eq!(page.query_all("#ytview-ad-banner").len(), 1);

        // Still in ad: banner is not duplicated
        actuator.on_still_in_ad(&mut page, Instant::now());
        assert_eq!(page.query_all("#ytview-ad-banner").len(), 1);
    }

    #[test]
    fn test_short_ad_is_seeked_to_end() {
        let (mut page, video) = ad_page(15.0);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        assert_eq!(actuator.on_ad_started(&mut page, &s, Instant::now()), SkipAction::SeekedToEnd);
        assert!((page.current_time(video) - 14.9).abs() < 1e-9);
        assert!(!page.paused(video));
        assert_eq!(actuator.applied().map(|a| a.paused_by_us), Some(false));
    }

    #[test]
    fn test_short_ad_without_countdown_is_not_seeked() {
        let mut page = MemoryPage::new("https://www.youtube.com/watch?v=abc");
        let body = page.root();
        let player = page.add(body, "div", Some("movie_player"), &["ad-showing"]);
        page.add(player, "span", None, &["ytp-ad-text"]);
        let video = page.add_video(player, MediaState::playing(15.0));
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);

        assert_eq!(actuator.on_ad_started(&mut page, &s, Instant::now()), SkipAction::None);
        assert_eq!(page.current_time(video), 0.0);
    }

    #[test]
    fn test_skip_button_is_clicked() {
        let (mut page, _) = ad_page(15.0);
        let body = page.root();
        let button = page.add(body, "button", None, &["ytp-ad-skip-button-modern"]);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        assert_eq!(actuator.on_ad_started(&mut page, &s, Instant::now()), SkipAction::Clicked);
        assert_eq!(page.click_count(button), 1);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let (mut page, video) = ad_page(120.0);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        actuator.on_ad_started(&mut page, &s, Instant::now());

        actuator.restore(&mut page);
        let styles = page.styles(video);
        let media = page.media_state(video).cloned();
        assert!(styles.is_empty());
        assert_eq!(media.as_ref().map(|m| (m.muted, m.paused)), Some((false, false)));
        assert!(page.query("#ytview-ad-banner").is_none());

        actuator.restore(&mut page);
        assert_eq!(page.styles(video), styles);
        assert_eq!(page.media_state(video).cloned(), media);
        assert!(page.query("#ytview-ad-banner").is_none());
        assert!(!actuator.is_active());
    }

    #[test]
    fn test_restore_keeps_user_mute() {
        let (mut page, video) = ad_page(120.0);
        page.set_muted(video, true);
        page.set_style(video, "border", "1px");
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        actuator.on_ad_started(&mut page, &s, Instant::now());
        actuator.restore(&mut page);
        assert!(page.muted(video));
        assert_eq!(page.style(video, "border").as_deref(), Some("1px"));
    }

    #[test]
    fn test_hide_reasserted_after_page_resets_style() {
        let (mut page, video) = ad_page(120.0);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        let start = Instant::now();
        actuator.on_ad_started(&mut page, &s, start);

        for (property, _) in HIDE_OVERRIDES {
            page.remove_style(video, property);
        }
        actuator.on_still_in_ad(&mut page, start);
        assert_eq!(page.style(video, "visibility").as_deref(), Some("hidden"));
        assert_eq!(page.style(video, "height").as_deref(), Some("1px"));

        actuator.restore(&mut page);
        assert!(page.styles(video).is_empty());
        assert!(!page.muted(video));
    }

    #[test]
    fn test_hide_follows_replaced_video() {
        let (mut page, old) = ad_page(120.0);
        let mut actuator = MitigationActuator::new(ClassifierConfig::default());
        let s = signals(&page);
        let start = Instant::now();
        actuator.on_ad_started(&mut page, &s, start);

        let player = page.query("#movie_player").unwrap();
        page.remove(old);
        let fresh = page.add_video(player, MediaState::playing(120.0));
        actuator.on_still_in_ad(&mut page, start);

        assert_eq!(page.style(fresh, "visibility").as_deref(), Some("hidden"));
        assert!(page.muted(fresh));
        assert_eq!(actuator.applied().map(|a| a.node), Some(fresh));

        actuator.restore(&mut page);
        assert!(page.styles(fresh).is_empty());
        assert!(!page.muted(fresh));
        assert!(!page.paused(fresh));
    }
}
