use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_filter_lists")]
    pub filter_lists: HashMap<String, String>,

    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_hours: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Tuning knobs for the page-side ad classifier.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    #[serde(default = "default_min_primary_indicators")]
    pub min_primary_indicators: usize,
    #[serde(default = "default_skip_button_definitive")]
    pub skip_button_definitive: bool,
    #[serde(default = "default_short_ad_max_secs")]
    pub short_ad_max_secs: f64,
    #[serde(default = "default_seek_epsilon_secs")]
    pub seek_epsilon_secs: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_min_reclassify_interval_ms")]
    pub min_reclassify_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_sponsorblock_url")]
    pub sponsorblock_url: String,
    #[serde(default = "default_branding_url")]
    pub branding_url: String,
    #[serde(default = "default_thumbnail_url")]
    pub thumbnail_url: String,
    #[serde(default = "default_dislike_url")]
    pub dislike_url: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    #[serde(default = "default_sponsor_categories")]
    pub sponsor_categories: Vec<String>,
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_enable")]
    pub enable: bool,
    #[serde(default = "default_log_blocked")]
    pub log_blocked: bool,
    #[serde(default)]
    pub log_allowed: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_request_log_sinks")]
    pub request_log_sinks: Vec<String>,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
    #[serde(default = "default_top_domains")]
    pub top_domains: usize,
}

// Defaults
fn default_max_age_days() -> u64 {
    7
}
fn default_batch_size() -> usize {
    500
}
fn default_concurrent_downloads() -> usize {
    4
}
fn default_refresh_interval() -> u64 {
    24
}
fn default_user_agent() -> String {
    "YTView/1.0".to_string()
}
fn default_min_primary_indicators() -> usize {
    2
}
fn default_skip_button_definitive() -> bool {
    true
}
fn default_short_ad_max_secs() -> f64 {
    60.0
}
fn default_seek_epsilon_secs() -> f64 {
    0.1
}
fn default_tick_interval_ms() -> u64 {
    500
}
fn default_min_reclassify_interval_ms() -> u64 {
    100
}
fn default_sponsorblock_url() -> String {
    "https://sponsor.ajay.app/api/skipSegments".to_string()
}
fn default_branding_url() -> String {
    "https://sponsor.ajay.app/api/branding".to_string()
}
fn default_thumbnail_url() -> String {
    "https://dearrow-thumb.ajay.app/api/v1/getThumbnail".to_string()
}
fn default_dislike_url() -> String {
    "https://returnyoutubedislikeapi.com/votes".to_string()
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_cache_capacity() -> u64 {
    1000
}
fn default_sponsor_categories() -> Vec<String> {
    [
        "sponsor",
        "selfpromo",
        "interaction",
        "intro",
        "outro",
        "preview",
        "music_offtopic",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_api_timeout_ms() -> u64 {
    5000
}
fn default_log_enable() -> bool {
    true
}
fn default_log_blocked() -> bool {
    true
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_request_log_sinks() -> Vec<String> {
    vec!["console".to_string()]
}
fn default_memory_capacity() -> usize {
    100
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}
fn default_top_domains() -> usize {
    5
}
fn default_filter_lists() -> HashMap<String, String> {
    let lists = [
        ("easylist", "https://easylist.to/easylist/easylist.txt"),
        ("easyprivacy", "https://easylist.to/easylist/easyprivacy.txt"),
        (
            "ublock-filters",
            "https://raw.githubusercontent.com/uBlockOrigin/uAssets/master/filters/filters.txt",
        ),
        (
            "ublock-annoyances",
            "https://raw.githubusercontent.com/uBlockOrigin/uAssets/master/filters/annoyances.txt",
        ),
        (
            "youtube-annoyances",
            "https://raw.githubusercontent.com/DandelionSprout/adfilt/master/BrowseWebsitesWithoutLoggingIn.txt",
        ),
        (
            "youtube-adblock-warning",
            "https://raw.githubusercontent.com/bogachenko/fuckfuckadblock/master/fuckfuckadblock.txt",
        ),
        (
            "adguard-base",
            "https://filters.adtidy.org/extension/ublock/filters/2_without_easylist.txt",
        ),
        (
            "brave-default",
            "https://raw.githubusercontent.com/brave/adblock-lists/master/brave-lists/default.txt",
        ),
    ];
    lists
        .iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter_lists: default_filter_lists(),
            settings_path: None,
            filters: FilterConfig::default(),
            classifier: ClassifierConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_age_days: default_max_age_days(),
            batch_size: default_batch_size(),
            concurrent_downloads: default_concurrent_downloads(),
            refresh_interval_hours: default_refresh_interval(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_primary_indicators: default_min_primary_indicators(),
            skip_button_definitive: default_skip_button_definitive(),
            short_ad_max_secs: default_short_ad_max_secs(),
            seek_epsilon_secs: default_seek_epsilon_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            min_reclassify_interval_ms: default_min_reclassify_interval_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            sponsorblock_url: default_sponsorblock_url(),
            branding_url: default_branding_url(),
            thumbnail_url: default_thumbnail_url(),
            dislike_url: default_dislike_url(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            sponsor_categories: default_sponsor_categories(),
            timeout_ms: default_api_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable: default_log_enable(),
            log_blocked: default_log_blocked(),
            log_allowed: false,
            format: default_log_format(),
            level: default_log_level(),
            request_log_sinks: default_request_log_sinks(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
            top_domains: default_top_domains(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    pub fn get_filter_lists_sorted(&self) -> Vec<(String, String)> {
        let mut list: Vec<_> = self
            .filter_lists
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Directory holding cached filter-list files.
    pub fn filter_cache_dir(&self) -> PathBuf {
        self.filters.cache_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ytview")
                .join("filter-lists")
        })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.settings_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ytview")
                .join("settings.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [filters]
            batch_size = 50

            [classifier]
            min_primary_indicators = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.filters.batch_size, 50);
        assert_eq!(config.filters.max_age_days, 7);
        assert_eq!(config.classifier.min_primary_indicators, 3);
        assert!(config.classifier.skip_button_definitive);
        assert_eq!(config.api.cache_ttl_secs, 3600);
        assert_eq!(config.filter_lists.len(), 8);
    }

    #[test]
    fn test_filter_lists_sorted_by_name() {
        let config = Config::default();
        let names: Vec<String> = config
            .get_filter_lists_sorted()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(names.first().map(String::as_str), Some("adguard-base"));
    }
}
