use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One stored image as seen by the catalog. Derived from the storage directory on
/// every scan; nothing here is held in a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageRecord {
    /// Stem of the stored filename.
    pub id: String,
    pub filename: String,
    /// Client-side filename at upload time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub original_name: Option<String>,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: String,
    #[ts(type = "number")]
    pub size: u64,
    /// `"<width>x<height>"` from the decoded image header.
    pub dimensions: String,
    pub mime_type: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn format_dimensions(width: u32, height: u32) -> String {
        format!("{width}x{height}")
    }
}

/// Query string accepted by `GET /images`.
///
/// `page` and `limit` are kept as raw strings so malformed values fall back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ListImagesQuery {
    #[serde(default)]
    #[ts(optional)]
    pub search: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub page: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub limit: Option<String>,
}

/// One page of the catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ListImagesResponse {
    pub images: Vec<ImageRecord>,
    #[ts(type = "number")]
    pub total: usize,
    #[ts(type = "number")]
    pub page: usize,
    #[ts(type = "number")]
    pub total_pages: usize,
    pub has_more: bool,
}
