//! Storage key construction and recognition.
//!
//! Photos live under the captain's namespace so they survive charter
//! deletion; charter videos wait for transcoding under a charter-scoped
//! `temp` prefix.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::domain::media::{extension_of, is_video_filename};

/// Document types accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    CharterMedia,
    Avatar,
    VerificationDoc,
    Unknown,
}

impl DocType {
    /// Values outside the allow-list collapse to `Unknown`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("charter_media") => Self::CharterMedia,
            Some("avatar") => Self::Avatar,
            Some("verification_doc") => Self::VerificationDoc,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharterMedia => "charter_media",
            Self::Avatar => "avatar",
            Self::VerificationDoc => "verification_doc",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPurpose {
    Photo,
    Video,
    Avatar,
    VerificationDoc,
    /// Stale clients that send an unrecognized docType.
    Legacy,
}

impl UploadPurpose {
    pub fn resolve(doc_type: DocType, filename: &str) -> Self {
        match doc_type {
            DocType::CharterMedia if is_video_filename(filename) => Self::Video,
            DocType::CharterMedia => Self::Photo,
            DocType::Avatar => Self::Avatar,
            DocType::VerificationDoc => Self::VerificationDoc,
            DocType::Unknown => Self::Legacy,
        }
    }

    pub fn is_image(&self, filename: &str) -> bool {
        match self {
            Self::Photo | Self::Avatar => true,
            Self::Legacy => !is_video_filename(filename),
            Self::Video | Self::VerificationDoc => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("video uploads require a charterId")]
    MissingCharterId,
    #[error("invalid charterId '{0}'")]
    InvalidCharterId(String),
}

/// Inputs to key construction.
#[derive(Debug, Clone)]
pub struct KeyRequest<'a> {
    pub user_id: Uuid,
    pub charter_id: Option<&'a str>,
    pub filename: &'a str,
    pub overwrite: bool,
    pub now: DateTime<Utc>,
}

pub fn build_key(purpose: UploadPurpose, req: &KeyRequest<'_>) -> Result<String, KeyError> {
    let safe = sanitize_filename(req.filename);
    let ts = req.now.timestamp_millis();
    let user = req.user_id;

    let key = match purpose {
        UploadPurpose::Photo => format!("captains/{user}/media/{ts}-{safe}"),
        UploadPurpose::Video => {
            let charter = req
                .charter_id
                .filter(|c| !c.trim().is_empty())
                .ok_or(KeyError::MissingCharterId)?;
            let charter = checked_segment(charter)?;
            format!("charters/{charter}/media/temp/{ts}-{safe}")
        }
        UploadPurpose::Avatar if req.overwrite => {
            let ext = extension_of(req.filename).unwrap_or_else(|| "jpg".to_string());
            format!("captains/{user}/avatar/avatar.{ext}")
        }
        UploadPurpose::Avatar => format!("captains/{user}/avatar/{ts}-{safe}"),
        UploadPurpose::VerificationDoc => format!("captains/{user}/docs/{ts}-{safe}"),
        UploadPurpose::Legacy => {
            let charter = match req.charter_id.filter(|c| !c.trim().is_empty()) {
                Some(c) => checked_segment(c)?,
                None => "unassigned".to_string(),
            };
            format!("charters/{charter}/media/{safe}")
        }
    };
    Ok(key)
}

fn checked_segment(raw: &str) -> Result<String, KeyError> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(KeyError::InvalidCharterId(raw.to_string()))
    }
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `-`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn legacy_image_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^charters/[^/]+/media/[^/]+$").expect("valid regex"))
}

fn storage_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(captains/[^/?#]+/(?:media|avatar)/[^?#]+|charters/[^/?#]+/media/[^?#]+)$")
            .expect("valid regex")
    })
}

fn embedded_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(captains/[^/?#]+/(?:media|avatar)/[^?#]+|charters/[^/?#]+/media/[^?#]+)")
            .expect("valid regex")
    })
}

/// Deprecated layout that stored images directly under the charter.
pub fn is_legacy_image_path(key: &str) -> bool {
    legacy_image_pattern().is_match(key)
}

pub fn is_storage_key(name: &str) -> bool {
    storage_key_pattern().is_match(name)
}

/// Recover a storage key from a public URL by locating a known prefix.
pub fn key_from_url(url: &str) -> Option<String> {
    embedded_key_pattern()
        .find(url)
        .map(|m| m.as_str().to_string())
}
