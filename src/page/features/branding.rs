use super::{Coordinator, FeatureKind};
use crate::page::context::PageContext;
use crate::page::dom::{NodeId, PageDom};
use crate::page::gate::Trigger;
use std::time::Instant;
use tracing::debug;

pub const TITLE_SELECTOR: &str = "h1.ytd-watch-metadata, .title.ytd-video-primary-info-renderer";
pub const THUMBNAIL_SELECTOR: &str = ".ytp-cued-thumbnail-overlay-image";

const TITLE_SUFFIX: &str = " - YouTube";

/// Replaces the watch-page title and cued thumbnail with crowd-sourced
/// alternatives, re-asserting them whenever the host page rewrites them.
#[derive(Debug, Default)]
pub struct BrandingOverride {
    original_titles: Vec<(NodeId, String)>,
    original_document_title: Option<String>,
    original_thumbnail: Option<(NodeId, Option<String>)>,
}

impl BrandingOverride {
    fn apply_title(&mut self, dom: &mut dyn PageDom, title: &str) {
        for node in dom.query_all(TITLE_SELECTOR) {
            let current = dom.text(node).unwrap_or_default();
            if current == title {
                continue;
            }
            if !self.original_titles.iter().any(|(n, _)| *n == node) {
                self.original_titles.push((node, current));
            }
            dom.set_text(node, title);
        }
        let wanted = format!("{}{}", title, TITLE_SUFFIX);
        let current = dom.document_title();
        if current != wanted {
            self.original_document_title.get_or_insert(current);
            dom.set_document_title(&wanted);
        }
    }

    fn apply_thumbnail(&mut self, dom: &mut dyn PageDom, image_url: &str) {
        let Some(node) = dom.query(THUMBNAIL_SELECTOR) else {
            return;
        };
        let wanted = format!("url(\"{}\")", image_url);
        let current = dom.style(node, "background-image");
        if current.as_deref() == Some(wanted.as_str()) {
            return;
        }
        if self.original_thumbnail.as_ref().map_or(true, |(n, _)| *n != node) {
            self.original_thumbnail = Some((node, current));
        }
        dom.set_style(node, "background-image", &wanted);
    }
}

impl Coordinator for BrandingOverride {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Branding
    }

    fn apply(&mut self, dom: &mut dyn PageDom, ctx: &PageContext, _now: Instant) {
        let Some(branding) = ctx.video.as_ref().and_then(|v| v.branding.as_ref()) else {
            return;
        };
        if let Some(title) = branding.best_title() {
            self.apply_title(dom, title);
        }
        if let Some(url) = branding.best_thumbnail() {
            self.apply_thumbnail(dom, url);
        }
    }

    fn cleanup(&mut self, dom: &mut dyn PageDom) {
        for (node, text) in self.original_titles.drain(..) {
            if dom.contains(node) {
                dom.set_text(node, &text);
            }
        }
        if let Some(title) = self.original_document_title.take() {
            dom.set_document_title(&title);
        }
        if let Some((node, style)) = self.original_thumbnail.take() {
            if dom.contains(node) {
                match style {
                    Some(value) => dom.set_style(node, "background-image", &value),
                    None => dom.remove_style(node, "background-image"),
                }
            }
        }
        debug!("Branding overrides cleared");
    }

    fn on_trigger(&mut self, trigger: &Trigger, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        if matches!(trigger, Trigger::Mutation { .. }) {
            self.apply(dom, ctx, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{BrandingData, BrandingThumbnail, BrandingTitle};
    use crate::page::context::VideoContext;
    use crate::page::memory::MemoryPage;

    fn context() -> PageContext {
        let mut video = VideoContext::new("abc", "YOU WON'T BELIEVE THIS", "https://www.youtube.com/watch?v=abc");
        video.branding = Some(BrandingData {
            titles: vec![BrandingTitle {
                title: "A calm description".to_string(),
                original: false,
                votes: 3,
            }],
            thumbnails: vec![BrandingThumbnail {
                timestamp: Some(42.0),
                image_url: Some("https://thumbs.example/abc.webp".to_string()),
                original: false,
            }],
        });
        PageContext {
            video: Some(video),
            ..Default::default()
        }
    }

    #[test]
    fn test_override_is_reasserted_and_reverted() {
        let mut page = MemoryPage::new("https://www.youtube.com/watch?v=abc");
        let body = page.root();
        let heading = page.add(body, "h1", None, &["ytd-watch-metadata"]);
        page.set_text(heading, "YOU WON'T BELIEVE THIS");
        page.set_document_title("YOU WON'T BELIEVE THIS - YouTube");
        let thumb = page.add(body, "div", None, &["ytp-cued-thumbnail-overlay-image"]);

        let ctx = context();
        let mut branding = BrandingOverride::default();
        branding.apply(&mut page, &ctx, Instant::now());
        assert_eq!(page.text(heading).as_deref(), Some("A calm description"));
        assert_eq!(page.document_title(), "A calm description - YouTube");
        assert_eq!(
            page.style(thumb, "background-image").as_deref(),
            Some("url(\"https://thumbs.example/abc.webp\")")
        );

        // Host page rewrites the title
        page.set_text(heading, "YOU WON'T BELIEVE THIS");
        branding.on_trigger(&Trigger::mutation(["style-scope"]), &mut page, &ctx, Instant::now());
        assert_eq!(page.text(heading).as_deref(), Some("A calm description"));

        branding.cleanup(&mut page);
        branding.cleanup(&mut page);
        assert_eq!(page.text(heading).as_deref(), Some("YOU WON'T BELIEVE THIS"));
        assert_eq!(page.document_title(), "YOU WON'T BELIEVE THIS - YouTube");
        assert_eq!(page.style(thumb, "background-image"), None);
    }
}
