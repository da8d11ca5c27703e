use serde::Serialize;

/// One classified outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogEntry {
    pub context: String,
    pub url: String,
    pub domain: String,
    pub action: RequestLogAction,
    /// Name of the layer that decided, e.g. `core` or `keyword`.
    pub layer: String,
    /// Glob or keyword that matched, if blocked.
    pub rule: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestLogAction {
    Allowed,
    Blocked,
}

pub trait RequestLogSink: Send + Sync {
    fn log(&self, entry: &RequestLogEntry);
}
