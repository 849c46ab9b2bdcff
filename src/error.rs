use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::repo::RepoError;
use crate::status::{InvalidTransition, UnknownValue};

/// Set once at startup; unset means development behaviour.
static VERBOSE_ERRORS: OnceCell<bool> = OnceCell::new();

/// Choose whether 500 responses carry the underlying error detail.
pub fn set_verbose_errors(verbose: bool) {
    let _ = VERBOSE_ERRORS.set(verbose);
}

fn verbose_errors() -> bool {
    *VERBOSE_ERRORS.get().unwrap_or(&true)
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("too many requests")]
    TooManyRequests,
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        ApiError::Internal(detail.to_string())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("not found".into()),
            RepoError::Conflict => ApiError::BadRequest("already exists".into()),
            RepoError::InvalidState(msg) => ApiError::InvalidState(msg),
            RepoError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<UnknownValue> for ApiError {
    fn from(e: UnknownValue) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<InvalidTransition> for ApiError {
    fn from(e: InvalidTransition) -> Self {
        ApiError::InvalidState(e.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            ApiError::Internal(detail) => {
                log::error!("internal error: {detail}");
                if verbose_errors() {
                    format!("internal error: {detail}")
                } else {
                    self.to_string()
                }
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_status_codes() {
        assert_eq!(ApiError::from(RepoError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(RepoError::InvalidState("paid".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(RepoError::Internal("db down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
