//! Per-video data from external lookup services, delivered to the page as
//! [`PageMessage`]s.

mod client;
mod source;
pub mod types;

pub use client::ApiClient;
pub use source::VideoDataSource;
pub use types::{BrandingData, BrandingThumbnail, BrandingTitle, DislikeData, SponsorSegment};

use crate::page::{PageMessage, SegmentsPayload};
use crate::settings::FeatureSettings;
use std::sync::Arc;
use tracing::debug;

/// Looks up everything the enabled features need for a video.
#[derive(Clone)]
pub struct VideoDataService {
    source: Arc<dyn VideoDataSource>,
}

impl VideoDataService {
    pub fn new(source: Arc<dyn VideoDataSource>) -> Self {
        Self { source }
    }

    /// Data messages for `video_id`, one per enabled feature that has data.
    pub async fn lookup(&self, video_id: &str, settings: &FeatureSettings) -> Vec<PageMessage> {
        let segments = async {
            if settings.sponsor_block_enabled {
                Some(self.source.sponsor_segments(video_id).await)
            } else {
                None
            }
        };
        let branding = async {
            if settings.dearrow_enabled {
                Some(self.source.branding(video_id).await)
            } else {
                None
            }
        };
        let dislikes = async {
            if settings.return_dislike_enabled {
                self.source.dislikes(video_id).await
            } else {
                None
            }
        };
        let (segments, branding, dislikes) = tokio::join!(segments, branding, dislikes);

        let mut messages = Vec::new();
        if let Some(segments) = segments {
            debug!("{} sponsor segments for {}", segments.len(), video_id);
            messages.push(PageMessage::SponsorSegmentsUpdated(SegmentsPayload { segments }));
        }
        if let Some(branding) = branding.filter(|b| !b.is_empty()) {
            messages.push(PageMessage::DearrowDataUpdated(branding));
        }
        if let Some(dislikes) = dislikes {
            messages.push(PageMessage::DislikeDataUpdated(dislikes));
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned;

    #[async_trait]
    impl VideoDataSource for Canned {
        async fn sponsor_segments(&self, _video_id: &str) -> Vec<SponsorSegment> {
            vec![SponsorSegment {
                start: 10.0,
                end: 25.0,
                category: "sponsor".to_string(),
            }]
        }
        async fn branding(&self, _video_id: &str) -> BrandingData {
            BrandingData::default()
        }
        async fn dislikes(&self, _video_id: &str) -> Option<DislikeData> {
            Some(DislikeData {
                likes: 1,
                dislikes: 15234,
            })
        }
    }

    #[tokio::test]
    async fn test_lookup_respects_settings() {
        let service = VideoDataService::new(Arc::new(Canned));
        let all = service.lookup("abc", &FeatureSettings::default()).await;
        // Empty branding is not forwarded
        assert_eq!(all.len(), 2);

        let settings = FeatureSettings {
            sponsor_block_enabled: false,
            ..FeatureSettings::default()
        };
        let some = service.lookup("abc", &settings).await;
        assert_eq!(
            some,
            vec![PageMessage::DislikeDataUpdated(DislikeData {
                likes: 1,
                dislikes: 15234
            })]
        );
    }
}
