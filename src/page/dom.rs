use std::fmt;

/// Handle to an element of a [`PageDom`]. Handles stay valid after the
/// element is removed; operations on detached elements are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The slice of the embedded page the classifier, actuator and feature
/// coordinators need.
///
/// Selectors are comma-separated alternatives of compound selectors
/// (`tag#id.class`). Lookups return elements in document order and only
/// consider elements attached to the document.
pub trait PageDom {
    fn query(&self, selector: &str) -> Option<NodeId> {
        self.query_all(selector).into_iter().next()
    }
    fn query_all(&self, selector: &str) -> Vec<NodeId>;
    /// Whether `node` is still attached to the document.
    fn contains(&self, node: NodeId) -> bool;
    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn text(&self, node: NodeId) -> Option<String>;
    fn set_text(&mut self, node: NodeId, text: &str);

    /// Inline style value, `None` if not set.
    fn style(&self, node: NodeId, property: &str) -> Option<String>;
    fn set_style(&mut self, node: NodeId, property: &str, value: &str);
    fn remove_style(&mut self, node: NodeId, property: &str);

    /// Returns `false` if the element could not be clicked.
    fn click(&mut self, node: NodeId) -> bool;

    /// Creates a detached element.
    fn create_element(&mut self, tag: &str, id: Option<&str>, class: Option<&str>) -> NodeId;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool;
    /// Inserts `node` as the next sibling of `reference`.
    fn insert_after(&mut self, reference: NodeId, node: NodeId) -> bool;
    fn remove(&mut self, node: NodeId);

    fn body(&self) -> Option<NodeId> {
        self.query("body")
    }
    fn location(&self) -> String;
    fn document_title(&self) -> String;
    fn set_document_title(&mut self, title: &str);

    // Media element state. Non-media nodes report neutral values.
    fn current_time(&self, media: NodeId) -> f64;
    fn set_current_time(&mut self, media: NodeId, secs: f64);
    /// `None` while unknown (metadata not loaded).
    fn duration(&self, media: NodeId) -> Option<f64>;
    fn paused(&self, media: NodeId) -> bool;
    fn pause(&mut self, media: NodeId);
    fn play(&mut self, media: NodeId);
    fn muted(&self, media: NodeId) -> bool;
    fn set_muted(&mut self, media: NodeId, muted: bool);
}
