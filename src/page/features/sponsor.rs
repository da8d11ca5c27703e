use super::{Coordinator, FeatureKind};
use crate::page::context::PageContext;
use crate::page::dom::{NodeId, PageDom};
use crate::page::gate::{PlayerEvent, Trigger};
use crate::page::signals::{PLAYER, VIDEO};
use std::time::{Duration, Instant};
use tracing::info;

pub const NOTIFICATION_ID: &str = "ytview-sb-notification";
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// Jumps over sponsor segments as playback enters them.
#[derive(Debug, Default)]
pub struct SponsorSkipper {
    notification: Option<(NodeId, Instant)>,
}

impl SponsorSkipper {
    fn show_notification(&mut self, dom: &mut dyn PageDom, text: &str, now: Instant) {
        self.remove_notification(dom);
        let Some(parent) = dom.query(PLAYER).or_else(|| dom.body()) else {
            return;
        };
        let node = dom.create_element("div", Some(NOTIFICATION_ID), None);
        dom.set_text(node, text);
        dom.append_child(parent, node);
        self.notification = Some((node, now + NOTIFICATION_TTL));
    }

    fn remove_notification(&mut self, dom: &mut dyn PageDom) {
        if let Some((node, _)) = self.notification.take() {
            dom.remove(node);
        }
        for stray in dom.query_all(&format!("#{}", NOTIFICATION_ID)) {
            dom.remove(stray);
        }
    }

    fn expire_notification(&mut self, dom: &mut dyn PageDom, now: Instant) {
        if matches!(self.notification, Some((_, until)) if now >= until) {
            self.remove_notification(dom);
        }
    }
}

impl Coordinator for SponsorSkipper {
    fn kind(&self) -> FeatureKind {
        FeatureKind::SponsorSkip
    }

    fn apply(&mut self, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        self.expire_notification(dom, now);
        let Some(video_ctx) = ctx.video.as_ref() else {
            return;
        };
        let Some(video) = dom.query(VIDEO) else {
            return;
        };
        let position = dom.current_time(video);
        if let Some(segment) = video_ctx.sponsor_segments.iter().find(|s| s.contains(position)) {
            info!(
                "Skipping {} segment {:.1}s -> {:.1}s",
                segment.category, segment.start, segment.end
            );
            dom.set_current_time(video, segment.end);
            self.show_notification(dom, &format!("Skipped {} segment", segment.category), now);
        }
    }

    fn cleanup(&mut self, dom: &mut dyn PageDom) {
        self.remove_notification(dom);
    }

    fn on_trigger(&mut self, trigger: &Trigger, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        match trigger {
            Trigger::Tick
            | Trigger::PlayerEvent(PlayerEvent::TimeUpdate)
            | Trigger::PlayerEvent(PlayerEvent::Seeking)
            | Trigger::PlayerEvent(PlayerEvent::Playing) => self.apply(dom, ctx, now),
            _ => self.expire_notification(dom, now),
        }
    }
}
