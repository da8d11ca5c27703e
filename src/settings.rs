//! User-facing feature flags and their persistence.

use crate::engine::BlockingToggle;
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureSettings {
    pub ad_blocking_enabled: bool,
    pub sponsor_block_enabled: bool,
    pub dearrow_enabled: bool,
    pub return_dislike_enabled: bool,
    pub download_enabled: bool,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            ad_blocking_enabled: true,
            sponsor_block_enabled: true,
            dearrow_enabled: true,
            return_dislike_enabled: true,
            download_enabled: true,
        }
    }
}

/// A partial update: only the flags present are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_blocking_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_block_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dearrow_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_dislike_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_enabled: Option<bool>,
}

impl FeatureSettings {
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            ad_blocking_enabled: patch.ad_blocking_enabled.unwrap_or(self.ad_blocking_enabled),
            sponsor_block_enabled: patch
                .sponsor_block_enabled
                .unwrap_or(self.sponsor_block_enabled),
            dearrow_enabled: patch.dearrow_enabled.unwrap_or(self.dearrow_enabled),
            return_dislike_enabled: patch
                .return_dislike_enabled
                .unwrap_or(self.return_dislike_enabled),
            download_enabled: patch.download_enabled.unwrap_or(self.download_enabled),
        }
    }
}

impl From<&FeatureSettings> for SettingsPatch {
    fn from(s: &FeatureSettings) -> Self {
        Self {
            ad_blocking_enabled: Some(s.ad_blocking_enabled),
            sponsor_block_enabled: Some(s.sponsor_block_enabled),
            dearrow_enabled: Some(s.dearrow_enabled),
            return_dislike_enabled: Some(s.return_dislike_enabled),
            download_enabled: Some(s.download_enabled),
        }
    }
}

/// Result of an update or reset, as reported back to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub success: bool,
    pub settings: FeatureSettings,
    pub error: Option<String>,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<FeatureSettings>>;
    async fn save(&self, settings: &FeatureSettings) -> Result<()>;
}

/// Pretty-printed JSON file. Unknown keys are ignored and missing keys
/// take their defaults.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<Option<FeatureSettings>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let settings = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(settings))
    }

    async fn save(&self, settings: &FeatureSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create settings directory")?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Owns the live [`FeatureSettings`] and keeps the network blocking
/// toggle in step with `adBlockingEnabled`.
pub struct SettingsManager {
    store: Box<dyn SettingsStore>,
    current: ArcSwap<FeatureSettings>,
    toggle: BlockingToggle,
    // Serialises update/rollback sequences
    write_lock: Mutex<()>,
}

impl SettingsManager {
    pub fn new(store: Box<dyn SettingsStore>, toggle: BlockingToggle) -> Self {
        let defaults = FeatureSettings::default();
        toggle.set_enabled(defaults.ad_blocking_enabled);
        Self {
            store,
            current: ArcSwap::from_pointee(defaults),
            toggle,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads saved settings over the defaults. A missing file is created
    /// with the defaults; an unreadable one is logged and ignored.
    pub async fn load(&self) -> FeatureSettings {
        let _guard = self.write_lock.lock().await;
        let settings = match self.store.load().await {
            Ok(Some(settings)) => {
                info!("Settings loaded: {:?}", settings);
                settings
            }
            Ok(None) => {
                let defaults = FeatureSettings::default();
                if let Err(e) = self.store.save(&defaults).await {
                    warn!("Could not write default settings: {:#}", e);
                }
                defaults
            }
            Err(e) => {
                error!("Error loading settings, using defaults: {:#}", e);
                FeatureSettings::default()
            }
        };
        self.publish(settings.clone());
        settings
    }

    pub fn get(&self) -> Arc<FeatureSettings> {
        self.current.load_full()
    }

    pub fn toggle(&self) -> &BlockingToggle {
        &self.toggle
    }

    /// Applies `patch` and persists it. When the save fails the in-memory
    /// settings are rolled back and the error is reported.
    pub async fn update(&self, patch: &SettingsPatch) -> SettingsUpdate {
        let _guard = self.write_lock.lock().await;
        let previous = self.current.load_full();
        let next = previous.merged(patch);
        self.commit(previous, next).await
    }

    pub async fn reset(&self) -> SettingsUpdate {
        let _guard = self.write_lock.lock().await;
        let previous = self.current.load_full();
        self.commit(previous, FeatureSettings::default()).await
    }

    async fn commit(&self, previous: Arc<FeatureSettings>, next: FeatureSettings) -> SettingsUpdate {
        self.publish(next.clone());
        match self.store.save(&next).await {
            Ok(()) => {
                info!("Settings saved: {:?}", next);
                SettingsUpdate {
                    success: true,
                    settings: next,
                    error: None,
                }
            }
            Err(e) => {
                error!("Failed to save settings, rolling back: {:#}", e);
                let restored = (*previous).clone();
                self.publish(restored.clone());
                SettingsUpdate {
                    success: false,
                    settings: restored,
                    error: Some(format!("Failed to save settings: {}", e)),
                }
            }
        }
    }

    fn publish(&self, settings: FeatureSettings) {
        self.toggle.set_enabled(settings.ad_blocking_enabled);
        self.current.store(Arc::new(settings));
    }
}
