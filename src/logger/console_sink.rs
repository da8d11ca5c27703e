use crate::config::LoggingConfig;
use crate::logger::types::{RequestLogAction, RequestLogEntry, RequestLogSink};
use tracing::info;

pub struct ConsoleLogSink {
    config: LoggingConfig,
}

impl ConsoleLogSink {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }
}

impl RequestLogSink for ConsoleLogSink {
    fn log(&self, entry: &RequestLogEntry) {
        if self.config.format == "json" {
            info!(
                target: "request",
                context = %entry.context,
                domain = %entry.domain,
                url = %entry.url,
                action = ?entry.action,
                layer = %entry.layer,
                rule = ?entry.rule
            );
            return;
        }

        match entry.action {
            RequestLogAction::Blocked => info!(
                "[{}] BLOCKED {} by {} ({})",
                entry.context,
                entry.url,
                entry.layer,
                entry.rule.as_deref().unwrap_or("-")
            ),
            RequestLogAction::Allowed => {
                info!("[{}] allowed {} ({})", entry.context, entry.url, entry.layer)
            }
        }
    }
}
