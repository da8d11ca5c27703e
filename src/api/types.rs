use serde::{Deserialize, Serialize};

/// A time range to skip, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorSegment {
    pub start: f64,
    pub end: f64,
    pub category: String,
}

impl SponsorSegment {
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Segment as returned by the lookup service: `{"segment": [s, e], "category": ..}`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSegment {
    pub segment: [f64; 2],
    pub category: String,
}

impl From<RawSegment> for SponsorSegment {
    fn from(raw: RawSegment) -> Self {
        Self {
            start: raw.segment[0],
            end: raw.segment[1],
            category: raw.category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingTitle {
    pub title: String,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingThumbnail {
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub original: bool,
}

/// Crowd-sourced title and thumbnail alternatives, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingData {
    #[serde(default)]
    pub titles: Vec<BrandingTitle>,
    #[serde(default)]
    pub thumbnails: Vec<BrandingThumbnail>,
}

impl BrandingData {
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty() && self.thumbnails.is_empty()
    }

    /// First title that is not the uploader's own.
    pub fn best_title(&self) -> Option<&str> {
        self.titles
            .iter()
            .find(|t| !t.original)
            .map(|t| t.title.as_str())
    }

    pub fn best_thumbnail(&self) -> Option<&str> {
        self.thumbnails
            .iter()
            .filter(|t| !t.original)
            .find_map(|t| t.image_url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DislikeData {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
}
