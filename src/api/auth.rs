use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use uuid::Uuid;

use super::shared::ApiError;
use crate::services::correlator::INTERNAL_TOKEN_HEADER;
use crate::state::AppState;

/// Header set by the session layer in front of the service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id. Rejects with 401 before the handler body runs.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(AuthenticatedUser)
            .ok_or(ApiError::Unauthorized);
        ready(user)
    }
}

/// Caller of the internal pipeline endpoints.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequest for InternalCaller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(pipeline) = req
            .app_data::<web::Data<AppState>>()
            .map(|s| &s.config.pipeline)
        else {
            return ready(Err(ApiError::Forbidden));
        };
        let expected = pipeline.internal_token.as_str();
        if expected.is_empty() {
            if pipeline.allow_open_internal {
                return ready(Ok(InternalCaller));
            }
            log::warn!("Rejected internal call to {}: no token configured", req.path());
            return ready(Err(ApiError::Forbidden));
        }
        let presented = req
            .headers()
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented == Some(expected) {
            ready(Ok(InternalCaller))
        } else {
            log::warn!("Rejected internal call to {}", req.path());
            ready(Err(ApiError::Forbidden))
        }
    }
}
