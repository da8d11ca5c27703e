//! Evidence collected from the player on every classification pass.

use super::dom::PageDom;

pub const PLAYER: &str = "#movie_player, .html5-video-player";
pub const VIDEO: &str = "video";
pub const AD_PLAYER_CLASSES: [&str; 2] = ["ad-showing", "ad-interrupting"];
pub const AD_OVERLAY: &str = ".ytp-ad-player-overlay, .ytp-ad-player-overlay-layout";
pub const AD_TEXT: &str = ".ytp-ad-text, .ytp-ad-simple-ad-badge";
pub const SKIP_BUTTON: &str = ".ytp-ad-skip-button, .ytp-ad-skip-button-modern, .ytp-skip-ad-button";
pub const AD_IMAGE_OVERLAY: &str = ".ytp-ad-image-overlay";
pub const AD_PREVIEW_TEXT: &str = ".ytp-ad-preview-text";
pub const AD_PROGRESS_BAR: &str = ".ytp-ad-persistent-progress-bar-container, .ytp-ad-progress-list";
pub const AD_REMAINING_TEXT: &str = ".ytp-ad-duration-remaining";

const URL_AD_MARKERS: [&str; 3] = ["adformat=", "ad_type=", "&ad_"];

/// Whether a class name added to the player subtree is worth a reclassify.
pub fn is_ad_class(class: &str) -> bool {
    AD_PLAYER_CLASSES.contains(&class) || class.starts_with("ytp-ad")
}

/// One sample of the page. The first eight fields are the primary
/// indicators; the rest feed the actuator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdSignalSet {
    pub player_has_ad_class: bool,
    pub overlay_present: bool,
    pub ad_text_present: bool,
    pub skip_button_present: bool,
    pub image_overlay_present: bool,
    pub preview_text_present: bool,
    pub progress_bar_present: bool,
    pub url_ad_marker: bool,
    pub remaining_text_present: bool,
    pub duration: Option<f64>,
}

impl AdSignalSet {
    /// Samples the page. A page without a player yields an empty set.
    pub fn sample(dom: &dyn PageDom) -> Self {
        let Some(player) = dom.query(PLAYER) else {
            return Self::default();
        };
        let location = dom.location();
        Self {
            player_has_ad_class: AD_PLAYER_CLASSES.iter().any(|c| dom.has_class(player, c)),
            overlay_present: dom.query(AD_OVERLAY).is_some(),
            ad_text_present: dom.query(AD_TEXT).is_some(),
            skip_button_present: dom.query(SKIP_BUTTON).is_some(),
            image_overlay_present: dom.query(AD_IMAGE_OVERLAY).is_some(),
            preview_text_present: dom.query(AD_PREVIEW_TEXT).is_some(),
            progress_bar_present: dom.query(AD_PROGRESS_BAR).is_some(),
            url_ad_marker: URL_AD_MARKERS.iter().any(|m| location.contains(m)),
            remaining_text_present: dom.query(AD_REMAINING_TEXT).is_some(),
            duration: dom.query(VIDEO).and_then(|v| dom.duration(v)),
        }
    }

    pub fn primary_count(&self) -> usize {
        [
            self.player_has_ad_class,
            self.overlay_present,
            self.ad_text_present,
            self.skip_button_present,
            self.image_overlay_present,
            self.preview_text_present,
            self.progress_bar_present,
            self.url_ad_marker,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}
