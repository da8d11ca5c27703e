//! Initialization helpers for the application startup.

use crate::config::Config;
use crate::engine::BlockingToggle;
use crate::logger::RequestLogger;
use crate::settings::{JsonFileStore, SettingsManager};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.logging.level.clone();

        // HTTP client internals are noise unless asked for by name
        for target in ["reqwest", "hyper", "hyper_util"] {
            if !filter.contains(target) {
                filter.push_str(&format!(",{}=off", target));
            }
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Request telemetry, or `None` when request logging is switched off.
pub fn init_request_logger(config: &Config) -> Option<Arc<RequestLogger>> {
    if !config.logging.enable {
        info!("Request logging disabled.");
        return None;
    }
    Some(RequestLogger::new(config.logging.clone()))
}

/// Settings persisted as JSON under the user's config directory, tied to
/// the network blocking toggle.
pub async fn init_settings(config: &Config, toggle: BlockingToggle) -> SettingsManager {
    let path = config.settings_file();
    info!("Using settings file {}", path.display());
    let manager = SettingsManager::new(Box::new(JsonFileStore::new(path)), toggle);
    manager.load().await;
    manager
}
