use super::{Coordinator, FeatureKind};
use crate::page::context::PageContext;
use crate::page::dom::{NodeId, PageDom};
use crate::page::gate::Trigger;
use std::time::Instant;

pub const DISLIKE_BUTTON: &str = "#dislike-button, dislike-button-view-model";
pub const COUNTER_CLASS: &str = "ytview-dislike-count";

/// Human-readable count: `999`, `15.2K`, `3.4M`.
pub fn format_count(count: u64) -> String {
    fn scaled(value: f64, suffix: &str) -> String {
        let text = format!("{:.1}", value);
        let text = text.strip_suffix(".0").unwrap_or(&text);
        format!("{}{}", text, suffix)
    }
    match count {
        0..=999 => count.to_string(),
        1_000..=999_949 => scaled(count as f64 / 1_000.0, "K"),
        _ => scaled(count as f64 / 1_000_000.0, "M"),
    }
}

/// Shows the dislike count next to the dislike button.
#[derive(Debug, Default)]
pub struct DislikeCounter {
    counter: Option<NodeId>,
}

impl Coordinator for DislikeCounter {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Dislikes
    }

    fn apply(&mut self, dom: &mut dyn PageDom, ctx: &PageContext, _now: Instant) {
        let Some(data) = ctx.video.as_ref().and_then(|v| v.dislikes) else {
            return;
        };
        let Some(button) = dom.query(DISLIKE_BUTTON) else {
            return;
        };
        let existing = self
            .counter
            .filter(|c| dom.contains(*c))
            .or_else(|| dom.query(&format!(".{}", COUNTER_CLASS)));
        let counter = match existing {
            Some(counter) => counter,
            None => {
                let counter = dom.create_element("span", None, Some(COUNTER_CLASS));
                if !dom.insert_after(button, counter) {
                    return;
                }
                counter
            }
        };
        dom.set_text(counter, &format_count(data.dislikes));
        self.counter = Some(counter);
    }

    fn cleanup(&mut self, dom: &mut dyn PageDom) {
        self.counter = None;
        for node in dom.query_all(&format!(".{}", COUNTER_CLASS)) {
            dom.remove(node);
        }
    }

    fn on_trigger(&mut self, trigger: &Trigger, dom: &mut dyn PageDom, ctx: &PageContext, now: Instant) {
        if matches!(trigger, Trigger::Mutation { .. } | Trigger::Tick) {
            self.apply(dom, ctx, now);
        }
    }
}
