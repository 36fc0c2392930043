use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::db::RepoError;
use crate::domain::charter::FinalizeErrorBody;
use crate::services::finalize::FinalizeError;
use crate::storage::StorageError;

/// Errors surfaced by the HTTP handlers.
///
/// Every variant renders as `{ok:false, error:<code>, message}` plus any
/// structured context the client needs to react.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{message}")]
    PayloadTooLarge {
        code: &'static str,
        message: String,
        limit_bytes: usize,
        size_bytes: usize,
    },

    #[error("version conflict")]
    VersionConflict { current_version: i32 },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{source}")]
    Finalize {
        source: FinalizeError,
        request_id: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::BadRequest { code, .. } => code,
            Self::NotFound { .. } => "not_found",
            Self::PayloadTooLarge { code, .. } => code,
            Self::VersionConflict { .. } => "version_conflict",
            Self::Unavailable(_) => "unavailable",
            Self::Finalize { source, .. } => source.code(),
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { entity, .. } => Self::NotFound { entity },
            RepoError::VersionConflict { current, .. } => Self::VersionConflict {
                current_version: current,
            },
            other => {
                log::error!("Repository error: {}", other);
                Self::Internal("Database error".to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        log::error!("Storage error: {}", e);
        Self::Internal("Storage error".to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Finalize { source, .. } => match source {
                FinalizeError::NotFound => StatusCode::NOT_FOUND,
                FinalizeError::VersionConflict { .. } => StatusCode::CONFLICT,
                FinalizeError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                FinalizeError::InvalidDraftData(_)
                | FinalizeError::MissingCaptainProfile
                | FinalizeError::Validation(_) => StatusCode::BAD_REQUEST,
                FinalizeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            Self::PayloadTooLarge {
                limit_bytes,
                size_bytes,
                ..
            } => builder.json(json!({
                "ok": false,
                "error": self.code(),
                "message": self.to_string(),
                "limitBytes": limit_bytes,
                "sizeBytes": size_bytes,
            })),
            Self::VersionConflict { current_version } => builder.json(json!({
                "ok": false,
                "error": self.code(),
                "message": self.to_string(),
                "currentVersion": current_version,
            })),
            Self::Finalize { source, request_id } => {
                let issues = match source {
                    FinalizeError::Validation(issues) => Some(issues.clone()),
                    _ => None,
                };
                builder.json(FinalizeErrorBody {
                    error: self.code().to_string(),
                    message: Some(source.to_string()),
                    issues,
                    request_id: Some(request_id.clone()),
                })
            }
            _ => builder.json(json!({
                "ok": false,
                "error": self.code(),
                "message": self.to_string(),
            })),
        }
    }
}
