// src/api/uploads.rs
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::shared::ApiError;
use crate::db::models::PendingMedia;
use crate::domain::media::{PendingKind, PendingStatus};
use crate::services::registrar::StoredVideo;
use crate::services::Counter;
use crate::state::AppState;
use crate::storage::keys::{build_key, is_legacy_image_path, DocType, KeyError, KeyRequest, UploadPurpose};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/uploads").route(web::post().to(upload_file)));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    pub url: String,
    pub key: String,
    pub overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_video_id: Option<Uuid>,
}

/// Whole multipart request, read before any validation.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    doc_type: Option<String>,
    charter_id: Option<String>,
    short_video: bool,
    overwrite: bool,
}

#[derive(Debug)]
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

fn truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Largest accepted text field.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

fn file_too_large(limit_bytes: usize, size_bytes: usize) -> ApiError {
    ApiError::PayloadTooLarge {
        code: "file_too_large",
        message: format!("Files are limited to {} MB", limit_bytes / (1024 * 1024)),
        limit_bytes,
        size_bytes,
    }
}

async fn read_text(field: &mut actix_multipart::Field) -> Result<String, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(ApiError::bad_request("invalid_field", "Form field too long"));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| ApiError::bad_request("invalid_field", "Form fields must be UTF-8"))
}

fn multipart_error(e: actix_multipart::MultipartError) -> ApiError {
    log::error!("Error reading multipart payload: {}", e);
    ApiError::bad_request("invalid_multipart", "Malformed upload")
}

/// Reads every field, refusing file bodies over `max_file_size` as soon as
/// the running total crosses it.
async fn read_form(mut payload: Multipart, max_file_size: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let Some(content_disposition) = field.content_disposition().cloned() else {
            while field.try_next().await.map_err(multipart_error)?.is_some() {}
            continue;
        };
        let field_name = content_disposition.get_name().unwrap_or_default();

        match field_name {
            "file" => {
                let filename = content_disposition
                    .get_filename()
                    .unwrap_or("upload")
                    .to_owned();
                let content_type = field.content_type().map(|m| m.to_string());
                let mut data = Vec::new();
                while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
                    let size = data.len() + chunk.len();
                    if size > max_file_size {
                        log::warn!("Upload {} exceeded {} bytes mid-stream", filename, max_file_size);
                        return Err(file_too_large(max_file_size, size));
                    }
                    data.extend_from_slice(&chunk);
                }
                form.file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "docType" => form.doc_type = Some(read_text(&mut field).await?),
            "charterId" => {
                let value = read_text(&mut field).await?;
                form.charter_id = Some(value).filter(|v| !v.trim().is_empty());
            }
            "shortVideo" => form.short_video = truthy(&read_text(&mut field).await?),
            "overwrite" => form.overwrite = truthy(&read_text(&mut field).await?),
            _ => {
                // Skip unknown fields
                while field.try_next().await.map_err(multipart_error)?.is_some() {}
            }
        }
    }

    Ok(form)
}

pub async fn upload_file(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let AuthenticatedUser(user_id) = user;
    let storage = &state.config.storage;
    let form = read_form(payload, storage.max_file_size).await?;

    let file = form
        .file
        .ok_or_else(|| ApiError::bad_request("missing_file", "No file provided"))?;
    let size_bytes = file.data.len();

    let doc_type = DocType::normalize(form.doc_type.as_deref());
    let purpose = UploadPurpose::resolve(doc_type, &file.filename);

    if purpose == UploadPurpose::Video && form.charter_id.is_none() {
        return Err(ApiError::bad_request(
            "video_requires_charterId",
            "Charter videos must be uploaded with a charterId",
        ));
    }

    if form.short_video && size_bytes > storage.short_video_max_bytes {
        return Err(ApiError::PayloadTooLarge {
            code: "short_video_too_large",
            message: format!(
                "Short videos are limited to {} MB",
                storage.short_video_max_bytes / (1024 * 1024)
            ),
            limit_bytes: storage.short_video_max_bytes,
            size_bytes,
        });
    }
    if size_bytes > storage.max_file_size {
        return Err(file_too_large(storage.max_file_size, size_bytes));
    }

    let key = build_key(
        purpose,
        &KeyRequest {
            user_id,
            charter_id: form.charter_id.as_deref(),
            filename: &file.filename,
            overwrite: form.overwrite,
            now: Utc::now(),
        },
    )
    .map_err(|e| match e {
        KeyError::MissingCharterId => ApiError::bad_request("video_requires_charterId", e.to_string()),
        KeyError::InvalidCharterId(_) => ApiError::bad_request("invalid_charterId", e.to_string()),
    })?;

    if purpose.is_image(&file.filename) && is_legacy_image_path(&key) {
        log::warn!(
            "Rejected legacy image path {} from user {} (docType {})",
            key,
            user_id,
            doc_type.as_str()
        );
        return Err(ApiError::bad_request(
            "legacy_image_path",
            "Images must be uploaded with docType charter_media or avatar",
        ));
    }

    let stored = state.blobs.put(&key, &file.data).await?;
    state
        .telemetry
        .incr(Counter::UploadsStored, &format!("key={} user={}", stored.key, user_id));

    let mut response = UploadResponse {
        ok: true,
        url: stored.url.clone(),
        key: stored.key.clone(),
        overwrite: form.overwrite,
        pending_id: None,
        captain_video_id: None,
    };

    if purpose == UploadPurpose::Video {
        let charter_id = form.charter_id.unwrap_or_default();
        let now = Utc::now().naive_utc();
        let pending = PendingMedia {
            id: Uuid::new_v4(),
            status: PendingStatus::Queued.as_str().to_string(),
            kind: PendingKind::Video.as_str().to_string(),
            original_key: stored.key.clone(),
            original_url: stored.url.clone(),
            final_key: None,
            final_url: None,
            thumbnail_key: None,
            thumbnail_url: None,
            size_bytes: Some(size_bytes as i64),
            mime_type: file.content_type.clone(),
            correlation_id: None,
            error: None,
            owner_id: user_id,
            charter_id: Some(charter_id.clone()),
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        };
        match state.repo.insert_pending_media(pending).await {
            Ok(pending) => response.pending_id = Some(pending.id),
            Err(e) => {
                log::error!("Failed to create pending media for {}: {}", stored.key, e);
                state
                    .telemetry
                    .incr(Counter::PendingRecordFailed, &format!("key={}", stored.key));
            }
        }

        let outcome = state
            .registrar()
            .register_video(&StoredVideo {
                user_id,
                charter_id,
                key: stored.key,
                url: stored.url,
                filename: file.filename,
                pending_id: response.pending_id,
            })
            .await;
        response.captain_video_id = outcome.captain_video_id;
    }

    Ok(HttpResponse::Ok().json(response))
}
