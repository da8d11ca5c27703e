pub mod console_sink;
pub mod memory_sink;
pub mod types;

pub use self::console_sink::ConsoleLogSink;
pub use self::memory_sink::MemoryLogSink;
pub use self::types::{RequestLogAction, RequestLogEntry, RequestLogSink};

use crate::config::LoggingConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

const SINK_BUFFER: usize = 1000;

/// Fans request decisions out to the configured sinks, each drained by
/// its own task.
pub struct RequestLogger {
    config: LoggingConfig,
    sinks: Vec<mpsc::Sender<RequestLogEntry>>,
    memory: Option<Arc<MemoryLogSink>>,
}

impl RequestLogger {
    pub fn new(config: LoggingConfig) -> Arc<Self> {
        let mut sinks = Vec::new();
        let mut memory = None;

        for sink_type in &config.request_log_sinks {
            match sink_type.as_str() {
                "console" => {
                    sinks.push(spawn_sink(Arc::new(ConsoleLogSink::new(config.clone()))));
                }
                "memory" => {
                    let sink = Arc::new(MemoryLogSink::new(config.memory_capacity));
                    sinks.push(spawn_sink(sink.clone()));
                    memory = Some(sink);
                }
                other => warn!("Unknown request log sink type: {}", other),
            }
        }

        Arc::new(Self {
            config,
            sinks,
            memory,
        })
    }

    /// A logger with explicitly supplied sinks, ignoring `request_log_sinks`.
    pub fn with_sinks(config: LoggingConfig, extra: Vec<Arc<dyn RequestLogSink>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sinks: extra.into_iter().map(spawn_sink).collect(),
            memory: None,
        })
    }

    /// The in-memory ring buffer, when the `memory` sink is configured.
    pub fn memory(&self) -> Option<&Arc<MemoryLogSink>> {
        self.memory.as_ref()
    }

    /// Whether an entry with this action would reach any sink.
    pub fn wants(&self, action: RequestLogAction) -> bool {
        if !self.config.enable || self.sinks.is_empty() {
            return false;
        }
        match action {
            RequestLogAction::Blocked => self.config.log_blocked,
            RequestLogAction::Allowed => self.config.log_allowed,
        }
    }

    /// Never blocks: entries are dropped when a sink falls behind.
    pub fn log(&self, entry: RequestLogEntry) {
        if !self.wants(entry.action) {
            return;
        }
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        for sink in rest {
            let _ = sink.try_send(entry.clone());
        }
        let _ = last.try_send(entry);
    }
}

fn spawn_sink(sink: Arc<dyn RequestLogSink>) -> mpsc::Sender<RequestLogEntry> {
    let (tx, mut rx) = mpsc::channel::<RequestLogEntry>(SINK_BUFFER);
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            sink.log(&entry);
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(action: RequestLogAction) -> RequestLogEntry {
        RequestLogEntry {
            context: "default".into(),
            url: "https://ads.example.com/x".into(),
            domain: "ads.example.com".into(),
            action,
            layer: "core".into(),
            rule: Some("*://*.example.com/*".into()),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_receives_blocked_only() {
        let config = LoggingConfig {
            request_log_sinks: vec!["memory".into()],
            ..LoggingConfig::default()
        };
        let logger = RequestLogger::new(config);
        logger.log(entry(RequestLogAction::Allowed));
        logger.log(entry(RequestLogAction::Blocked));

        let memory = logger.memory().unwrap().clone();
        for _ in 0..50 {
            if !memory.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recent = memory.get_recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, RequestLogAction::Blocked);
    }

    #[test]
    fn test_memory_sink_is_bounded() {
        let sink = MemoryLogSink::new(2);
        for _ in 0..5 {
            sink.log(&entry(RequestLogAction::Blocked));
        }
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_entry_serializes_lowercase_action() {
        let json = serde_json::to_value(entry(RequestLogAction::Blocked)).unwrap();
        assert_eq!(json["action"], "blocked");
    }
}
