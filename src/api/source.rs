use super::types::{BrandingData, DislikeData, SponsorSegment};
use async_trait::async_trait;

/// Read-only per-video lookups. Implementations never fail: a missing
/// video or an unreachable service yields an empty result.
#[async_trait]
pub trait VideoDataSource: Send + Sync {
    async fn sponsor_segments(&self, video_id: &str) -> Vec<SponsorSegment>;
    async fn branding(&self, video_id: &str) -> BrandingData;
    async fn dislikes(&self, video_id: &str) -> Option<DislikeData>;
}
