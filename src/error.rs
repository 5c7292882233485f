use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::repo::RepoError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] Validation(String),
    #[error("authentication required")] Unauthenticated,
    #[error("sender does not match the authenticated user")] IdentityMismatch,
    #[error("not found")] NotFound,
    #[error("insufficient permissions")] Forbidden,
    #[error("suggestion is closed")] SuggestionClosed,
    #[error("conflict")] Conflict,
    #[error("rate limited")] RateLimited,
    #[error("{0} is not configured")] ServiceUnavailable(&'static str),
    #[error("internal error")] Internal,
}

impl ApiError {
    /// Stable machine-readable code rendered next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::IdentityMismatch => "identity_mismatch",
            ApiError::NotFound => "not_found",
            ApiError::Forbidden => "forbidden",
            ApiError::SuggestionClosed => "suggestion_closed",
            ApiError::Conflict => "conflict",
            ApiError::RateLimited => "rate_limited",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal => "internal",
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(msg) => {
                tracing::error!("document store failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Misconfigured(msg) => {
                tracing::error!("identity provider misconfigured: {msg}");
                ApiError::Internal
            }
            _ => ApiError::Unauthenticated,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = e.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        ApiError::Validation(format!("invalid field(s): {}", fields.join(", ")))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::IdentityMismatch | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::SuggestionClosed | ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        })
    }
}
