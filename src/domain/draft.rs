//! Draft document shapes shared by the draft endpoints and the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::media::MediaRef;

/// Bumped whenever `DraftData` changes shape.
pub const FORM_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    Draft,
    Submitted,
    Abandoned,
    Deleted,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Abandoned => "ABANDONED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(Self::Draft),
            "SUBMITTED" => Some(Self::Submitted),
            "ABANDONED" => Some(Self::Abandoned),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptainBasics {
    pub display_name: String,
    pub phone: String,
    pub bio: String,
    pub experience_years: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharterBasics {
    pub name: String,
    pub charter_type: String,
    pub state: String,
    pub city: String,
    pub starting_point: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoatDetails {
    pub name: String,
    pub boat_type: String,
    pub length_ft: Option<u32>,
    pub capacity: Option<u32>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripDraft {
    pub name: String,
    pub trip_type: String,
    pub duration_hours: Option<f32>,
    pub price: Option<f64>,
    pub max_anglers: Option<u32>,
    pub start_times: Vec<String>,
}

/// Draft-safe serialization of the onboarding form.
///
/// Holds only references to media that already reached blob storage; local
/// file bytes never appear here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftData {
    pub captain: CaptainBasics,
    pub charter: CharterBasics,
    pub amenities: Vec<String>,
    pub boat: BoatDetails,
    pub trips: Vec<TripDraft>,
    pub uploaded_images: Vec<MediaRef>,
    pub uploaded_videos: Vec<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_order: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_cover_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<MediaRef>,
}

/// Body of `PATCH /drafts/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatchRequest {
    pub data_partial: Value,
    pub client_version: i32,
    pub current_step: i32,
}

/// Draft as returned by the draft endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub id: String,
    pub version: i32,
    pub current_step: i32,
    pub status: DraftStatus,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEnvelope {
    pub draft: DraftView,
}

/// Shallow-merge `partial` into `existing`: top-level keys of a partial
/// object replace the stored ones, other keys are kept. A non-object stored
/// document is replaced outright.
pub fn merge_partial(existing: &mut Value, partial: Value) {
    match (existing.as_object_mut(), partial) {
        (Some(target), Value::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (_, Value::Null) => {}
        (_, other) => *existing = other,
    }
}
