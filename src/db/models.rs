use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::draft::{DraftStatus, DraftView};
use crate::domain::media::{PendingKind, PendingStatus, PendingStatusItem};

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::charter_media)]
pub struct CharterMedia {
    pub id: Uuid,
    pub charter_id: String,
    pub kind: String,
    pub url: String,
    pub storage_key: String,
    pub sort_order: i32,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::captain_videos)]
pub struct CaptainVideo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_url: String,
    pub blob_key: String,
    pub process_status: String,
    pub ready_720p_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub processed_duration_sec: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::db::schema::captain_videos)]
pub struct CaptainVideoUpdate {
    pub process_status: Option<String>,
    pub ready_720p_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub processed_duration_sec: Option<f64>,
    pub error_message: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::pending_media)]
pub struct PendingMedia {
    pub id: Uuid,
    pub status: String,
    pub kind: String,
    pub original_key: String,
    pub original_url: String,
    pub final_key: Option<String>,
    pub final_url: Option<String>,
    pub thumbnail_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub correlation_id: Option<String>,
    pub error: Option<String>,
    pub owner_id: Uuid,
    pub charter_id: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::db::schema::pending_media)]
pub struct PendingMediaUpdate {
    pub status: Option<String>,
    pub final_key: Option<String>,
    pub final_url: Option<String>,
    pub thumbnail_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub correlation_id: Option<String>,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
    pub updated_at: Option<NaiveDateTime>,
}

impl PendingMedia {
    pub fn to_status_item(&self) -> PendingStatusItem {
        PendingStatusItem {
            id: self.id.to_string(),
            status: PendingStatus::parse(&self.status).unwrap_or(PendingStatus::Queued),
            kind: PendingKind::parse(&self.kind).unwrap_or(PendingKind::Video),
            final_key: self.final_key.clone(),
            final_url: self.final_url.clone(),
            original_url: Some(self.original_url.clone()),
            thumbnail_url: self.thumbnail_url.clone(),
            duration_seconds: self.duration_seconds,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::charter_drafts)]
pub struct CharterDraft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub version: i32,
    pub current_step: i32,
    pub form_version: i32,
    pub data: Value,
    pub last_touched_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl CharterDraft {
    pub fn draft_status(&self) -> DraftStatus {
        DraftStatus::parse(&self.status).unwrap_or(DraftStatus::Draft)
    }

    pub fn to_view(&self) -> DraftView {
        DraftView {
            id: self.id.to_string(),
            version: self.version,
            current_step: self.current_step,
            status: self.draft_status(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::captain_profiles)]
pub struct CaptainProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub experience_years: Option<i32>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Insertable, Clone, PartialEq)]
#[diesel(table_name = crate::db::schema::charters)]
pub struct Charter {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub captain_profile_id: Uuid,
    pub name: String,
    pub status: String,
    pub data: Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
