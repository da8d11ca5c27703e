//! A small in-memory document implementing [`PageDom`], used by the
//! headless host and by tests.

use super::dom::{NodeId, PageDom};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaState {
    pub current_time: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub muted: bool,
}

impl MediaState {
    pub fn playing(duration: f64) -> Self {
        Self {
            current_time: 0.0,
            duration: Some(duration),
            paused: false,
            muted: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    text: String,
    style: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    clicks: u32,
    media: Option<MediaState>,
}

impl Element {
    fn new(tag: &str, id: Option<&str>, classes: &[&str]) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: id.map(str::to_string),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            text: String::new(),
            style: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            clicks: 0,
            media: None,
        }
    }
}

/// One alternative of a selector list: `tag#id.class.class`.
#[derive(Debug, Default)]
struct Compound<'a> {
    tag: Option<&'a str>,
    id: Option<&'a str>,
    classes: Vec<&'a str>,
}

impl<'a> Compound<'a> {
    fn parse(s: &'a str) -> Self {
        let mut compound = Compound::default();
        let mut start = 0;
        let mut kind = b't';
        let bytes = s.as_bytes();
        for i in 0..=bytes.len() {
            if i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'#' {
                continue;
            }
            let part = &s[start..i];
            if !part.is_empty() {
                match kind {
                    b'#' => compound.id = Some(part),
                    b'.' => compound.classes.push(part),
                    _ => compound.tag = Some(part),
                }
            }
            if i < bytes.len() {
                kind = bytes[i];
                start = i + 1;
            }
        }
        compound
    }

    fn matches(&self, el: &Element) -> bool {
        self.tag.map_or(true, |t| el.tag.eq_ignore_ascii_case(t))
            && self.id.map_or(true, |id| el.id.as_deref() == Some(id))
            && self.classes.iter().all(|c| el.classes.iter().any(|ec| ec == c))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPage {
    nodes: FxHashMap<NodeId, Element>,
    root: NodeId,
    next_id: u64,
    location: String,
    title: String,
}

impl MemoryPage {
    /// An empty document with only a `<body>`.
    pub fn new(location: &str) -> Self {
        let root = NodeId(0);
        let mut nodes = FxHashMap::default();
        nodes.insert(root, Element::new("body", None, &[]));
        Self {
            nodes,
            root,
            next_id: 1,
            location: location.to_string(),
            title: "YouTube".to_string(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Creates an element and appends it to `parent`.
    pub fn add(&mut self, parent: NodeId, tag: &str, id: Option<&str>, classes: &[&str]) -> NodeId {
        let node = self.alloc(Element::new(tag, id, classes));
        self.append_child(parent, node);
        node
    }

    /// Appends a `<video>` with the given media state.
    pub fn add_video(&mut self, parent: NodeId, media: MediaState) -> NodeId {
        let node = self.add(parent, "video", None, &[]);
        if let Some(el) = self.nodes.get_mut(&node) {
            el.media = Some(media);
        }
        node
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(el) = self.nodes.get_mut(&node) {
            if !el.classes.iter().any(|c| c == class) {
                el.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(el) = self.nodes.get_mut(&node) {
            el.classes.retain(|c| c != class);
        }
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = location.to_string();
    }

    pub fn media_state(&self, node: NodeId) -> Option<&MediaState> {
        self.nodes.get(&node).and_then(|el| el.media.as_ref())
    }

    pub fn click_count(&self, node: NodeId) -> u32 {
        self.nodes.get(&node).map_or(0, |el| el.clicks)
    }

    /// All inline styles of `node`, sorted by property.
    pub fn styles(&self, node: NodeId) -> Vec<(String, String)> {
        self.nodes
            .get(&node)
            .map(|el| {
                el.style
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn alloc(&mut self, el: Element) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, el);
        id
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|el| el.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }
    }

    fn media_mut(&mut self, node: NodeId) -> Option<&mut MediaState> {
        self.nodes.get_mut(&node).and_then(|el| el.media.as_mut())
    }

    /// Attached elements in document order.
    fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(el) = self.nodes.get(&node) {
                stack.extend(el.children.iter().rev());
            }
        }
        out
    }
}

impl PageDom for MemoryPage {
    fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let alternatives: Vec<Compound> = selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Compound::parse)
            .collect();
        self.walk()
            .into_iter()
            .filter(|node| {
                self.nodes
                    .get(node)
                    .is_some_and(|el| alternatives.iter().any(|c| c.matches(el)))
            })
            .collect()
    }

    fn contains(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.root {
                return true;
            }
            current = self.nodes.get(&n).and_then(|el| el.parent);
        }
        false
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|el| el.classes.iter().any(|c| c == class))
    }

    fn text(&self, node: NodeId) -> Option<String> {
        self.nodes.get(&node).map(|el| el.text.clone())
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(el) = self.nodes.get_mut(&node) {
            el.text = text.to_string();
        }
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.nodes
            .get(&node)
            .and_then(|el| el.style.get(property).cloned())
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        if let Some(el) = self.nodes.get_mut(&node) {
            el.style.insert(property.to_string(), value.to_string());
        }
    }

    fn remove_style(&mut self, node: NodeId, property: &str) {
        if let Some(el) = self.nodes.get_mut(&node) {
            el.style.remove(property);
        }
    }

    fn click(&mut self, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        match self.nodes.get_mut(&node) {
            Some(el) => {
                el.clicks += 1;
                true
            }
            None => false,
        }
    }

    fn create_element(&mut self, tag: &str, id: Option<&str>, class: Option<&str>) -> NodeId {
        let classes: Vec<&str> = class.map(|c| c.split_whitespace().collect()).unwrap_or_default();
        self.alloc(Element::new(tag, id, &classes))
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return false;
        }
        self.detach(child);
        if let Some(el) = self.nodes.get_mut(&child) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.nodes.get_mut(&parent) {
            el.children.push(child);
        }
        true
    }

    fn insert_after(&mut self, reference: NodeId, node: NodeId) -> bool {
        let Some(parent) = self.nodes.get(&reference).and_then(|el| el.parent) else {
            return false;
        };
        if reference == node || !self.nodes.contains_key(&node) {
            return false;
        }
        self.detach(node);
        if let Some(el) = self.nodes.get_mut(&node) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.nodes.get_mut(&parent) {
            let idx = el
                .children
                .iter()
                .position(|c| *c == reference)
                .map_or(el.children.len(), |i| i + 1);
            el.children.insert(idx, node);
        }
        true
    }

    fn remove(&mut self, node: NodeId) {
        if node != self.root {
            self.detach(node);
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn document_title(&self) -> String {
        self.title.clone()
    }

    fn set_document_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn current_time(&self, media: NodeId) -> f64 {
        self.media_state(media).map_or(0.0, |m| m.current_time)
    }

    fn set_current_time(&mut self, media: NodeId, secs: f64) {
        if let Some(m) = self.media_mut(media) {
            m.current_time = secs;
        }
    }

    fn duration(&self, media: NodeId) -> Option<f64> {
        self.media_state(media).and_then(|m| m.duration)
    }

    fn paused(&self, media: NodeId) -> bool {
        self.media_state(media).map_or(true, |m| m.paused)
    }

    fn pause(&mut self, media: NodeId) {
        if let Some(m) = self.media_mut(media) {
            m.paused = true;
        }
    }

    fn play(&mut self, media: NodeId) {
        if let Some(m) = self.media_mut(media) {
            m.paused = false;
        }
    }

    fn muted(&self, media: NodeId) -> bool {
        self.media_state(media).is_some_and(|m| m.muted)
    }

    fn set_muted(&mut self, media: NodeId, muted: bool) {
        if let Some(m) = self.media_mut(media) {
            m.muted = muted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_alternatives_and_document_order() {
        let mut page = MemoryPage::new("https://www.youtube.com/");
        let body = page.root();
        let player = page.add(body, "div", Some("movie_player"), &["html5-video-player", "ad-showing"]);
        let text = page.add(player, "span", None, &["ytp-ad-text"]);

        assert_eq!(page.query("#movie_player"), Some(player));
        assert_eq!(page.query("div.html5-video-player.ad-showing"), Some(player));
        assert_eq!(page.query(".missing, .ytp-ad-text"), Some(text));
        assert_eq!(page.query_all("div, span"), vec![player, text]);
        assert_eq!(page.query("span.ad-showing"), None);
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let mut page = MemoryPage::new("https://www.youtube.com/");
        let body = page.root();
        let outer = page.add(body, "div", None, &["outer"]);
        let inner = page.add(outer, "div", None, &["inner"]);
        page.remove(outer);
        assert!(!page.contains(inner));
        assert_eq!(page.query(".inner"), None);
        assert!(!page.click(inner));
    }

    #[test]
    fn test_insert_after() {
        let mut page = MemoryPage::new("https://www.youtube.com/");
        let body = page.root();
        let a = page.add(body, "div", Some("a"), &[]);
        let c = page.add(body, "div", Some("c"), &[]);
        let b = page.create_element("span", Some("b"), Some("x y"));
        assert!(page.insert_after(a, b));
        assert_eq!(page.query_all("div, span"), vec![a, b, c]);
        assert!(page.has_class(b, "y"));
    }
}
