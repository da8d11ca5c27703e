//! Messages exchanged between the host and the embedded page.
//!
//! On the wire each message is `{"type": "<kebab-case>", "data": {..}}`.

use crate::api::types::{BrandingData, DislikeData, SponsorSegment};
use crate::settings::SettingsPatch;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub video_id: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentsPayload {
    pub segments: Vec<SponsorSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum PageMessage {
    VideoIdChanged(VideoInfo),
    RequestSettings,
    UpdateSettings(SettingsPatch),
    SponsorSegmentsUpdated(SegmentsPayload),
    DearrowDataUpdated(BrandingData),
    DislikeDataUpdated(DislikeData),
    InitializeAdBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Peer {
    Host,
    Page,
}

/// A message together with the peer that sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub source: Peer,
    pub message: PageMessage,
}

impl MessageEnvelope {
    pub fn from_host(message: PageMessage) -> Self {
        Self {
            source: Peer::Host,
            message,
        }
    }

    pub fn from_page(message: PageMessage) -> Self {
        Self {
            source: Peer::Page,
            message,
        }
    }
}

/// Unwraps `envelope` only if it came from `expected`.
pub fn accept(expected: Peer, envelope: MessageEnvelope) -> Option<PageMessage> {
    if envelope.source != expected {
        warn!(
            "Dropping message from unexpected peer {:?} (expected {:?})",
            envelope.source, expected
        );
        return None;
    }
    Some(envelope.message)
}
