use super::source::VideoDataSource;
use super::types::{BrandingData, DislikeData, RawSegment, SponsorSegment};
use crate::config::ApiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

enum Lookup<T> {
    Found(T),
    /// The service has nothing for this video. Cached like a hit.
    NotFound,
    /// Transport, status or decoding failure. Not cached.
    Failed,
}

/// HTTP client for the three lookup services with a per-video TTL cache.
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    segments: Cache<Arc<str>, Vec<SponsorSegment>>,
    branding: Cache<Arc<str>, BrandingData>,
    dislikes: Cache<Arc<str>, Option<DislikeData>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build API client")?;
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Ok(Self {
            client,
            config: config.clone(),
            segments: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(ttl)
                .build(),
            branding: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(ttl)
                .build(),
            dislikes: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(ttl)
                .build(),
        })
    }

    /// Thumbnail rendered by the thumbnail service at `timestamp` seconds.
    pub fn thumbnail_url(&self, video_id: &str, timestamp: f64) -> Option<String> {
        Url::parse_with_params(
            &self.config.thumbnail_url,
            &[("videoID", video_id), ("time", &timestamp.to_string())],
        )
        .ok()
        .map(String::from)
    }

    async fn get_json<T: DeserializeOwned>(&self, what: &str, base: &str, params: &[(&str, &str)]) -> Lookup<T> {
        let url = match Url::parse_with_params(base, params) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid {} endpoint {}: {}", what, base, e);
                return Lookup::Failed;
            }
        };
        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("{} lookup failed: {}", what, e);
                return Lookup::Failed;
            }
        };
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("{} lookup: nothing for {}", what, url);
                Lookup::NotFound
            }
            status if status.is_success() => match response.json::<T>().await {
                Ok(data) => Lookup::Found(data),
                Err(e) => {
                    warn!("{} lookup returned malformed data: {}", what, e);
                    Lookup::Failed
                }
            },
            status => {
                warn!("{} lookup returned status {}", what, status);
                Lookup::Failed
            }
        }
    }

    fn fill_thumbnail_urls(&self, video_id: &str, data: &mut BrandingData) {
        for thumb in data.thumbnails.iter_mut() {
            if thumb.image_url.is_none() {
                if let Some(ts) = thumb.timestamp {
                    thumb.image_url = self.thumbnail_url(video_id, ts);
                }
            }
        }
    }
}

#[async_trait]
impl VideoDataSource for ApiClient {
    async fn sponsor_segments(&self, video_id: &str) -> Vec<SponsorSegment> {
        if let Some(hit) = self.segments.get(video_id).await {
            return hit;
        }
        let categories = serde_json::to_string(&self.config.sponsor_categories).unwrap_or_default();
        let params = [("videoID", video_id), ("categories", categories.as_str())];
        let segments = match self
            .get_json::<Vec<RawSegment>>("Sponsor segment", &self.config.sponsorblock_url, &params)
            .await
        {
            Lookup::Found(raw) => raw.into_iter().map(SponsorSegment::from).collect(),
            Lookup::NotFound => Vec::new(),
            Lookup::Failed => return Vec::new(),
        };
        self.segments.insert(Arc::from(video_id), segments.clone()).await;
        segments
    }

    async fn branding(&self, video_id: &str) -> BrandingData {
        if let Some(hit) = self.branding.get(video_id).await {
            return hit;
        }
        let mut data = match self
            .get_json::<BrandingData>("Branding", &self.config.branding_url, &[("videoID", video_id)])
            .await
        {
            Lookup::Found(data) => data,
            Lookup::NotFound => BrandingData::default(),
            Lookup::Failed => return BrandingData::default(),
        };
        self.fill_thumbnail_urls(video_id, &mut data);
        self.branding.insert(Arc::from(video_id), data.clone()).await;
        data
    }

    async fn dislikes(&self, video_id: &str) -> Option<DislikeData> {
        if let Some(hit) = self.dislikes.get(video_id).await {
            return hit;
        }
        let data = match self
            .get_json::<DislikeData>("Dislike", &self.config.dislike_url, &[("videoId", video_id)])
            .await
        {
            Lookup::Found(data) => Some(data),
            Lookup::NotFound => None,
            Lookup::Failed => return None,
        };
        self.dislikes.insert(Arc::from(video_id), data).await;
        data
    }
}
