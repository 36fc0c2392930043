//! Media status and kind enumerations shared by the service and the client.
//!
//! Database rows keep these as plain strings; the `as_str` / `parse`
//! pairs are the only place the spellings live.

use serde::{Deserialize, Serialize};

/// Extensions treated as video uploads.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm", "avi", "mkv", "3gp"];

/// Returns true when the file name carries a known video extension.
pub fn is_video_filename(name: &str) -> bool {
    extension_of(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Lower-cased extension of a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Processing state of a pending media record (legacy pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingStatus {
    Queued,
    Transcoding,
    Ready,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Transcoding => "TRANSCODING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "TRANSCODING" => Some(Self::Transcoding),
            "READY" => Some(Self::Ready),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingKind {
    Image,
    Video,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IMAGE" => Some(Self::Image),
            "VIDEO" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Processing state of a `CaptainVideo` (new pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Kind of a legacy `CharterMedia` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharterMediaKind {
    CharterPhoto,
    CharterVideo,
}

impl CharterMediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharterPhoto => "CHARTER_PHOTO",
            Self::CharterVideo => "CHARTER_VIDEO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHARTER_PHOTO" => Some(Self::CharterPhoto),
            "CHARTER_VIDEO" => Some(Self::CharterVideo),
            _ => None,
        }
    }
}

/// An uploaded media reference: storage key (`name`) plus public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub name: String,
    pub url: String,
}

impl MediaRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One entry of the pending-status endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStatusItem {
    pub id: String,
    pub status: PendingStatus,
    pub kind: PendingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingStatusResponse {
    pub items: Vec<PendingStatusItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_video_extensions_case_insensitively() {
        assert!(is_video_filename("clip.MP4"));
        assert!(is_video_filename("trip.final.mov"));
        assert!(!is_video_filename("boat.jpg"));
        assert!(!is_video_filename("mp4"));
        assert!(!is_video_filename(".mp4"));
    }

    #[test]
    fn pending_status_uses_screaming_case_on_the_wire() {
        let item: PendingStatusItem = serde_json::from_str(
            r#"{"id":"a","status":"TRANSCODING","kind":"VIDEO","finalUrl":null}"#,
        )
        .unwrap();
        assert_eq!(item.status, PendingStatus::Transcoding);
        assert_eq!(item.final_url, None);
        assert_eq!(PendingStatus::parse("READY"), Some(PendingStatus::Ready));
        assert_eq!(ProcessStatus::parse("processing"), Some(ProcessStatus::Processing));
    }
}
