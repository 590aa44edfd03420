use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{rate_limit::RateLimited, recovery::RecoveryError};

#[derive(Debug, Serialize)]
pub struct ErrorRep {
    pub message: String,
}

pub const INVALID_TOKEN_MESSAGE: &str = "The password reset link is invalid or has expired.";

#[derive(Debug)]
pub enum ApiError {
    BadRequestReason(String),
    InternalServerError,
    TooManyRequests(RateLimited),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequestReason(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorRep { message })).into_response()
            }
            Self::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorRep {
                    message: "Internal server error.".to_owned(),
                }),
            )
                .into_response(),
            Self::TooManyRequests(limited) => limited.into_response(),
        }
    }
}

impl From<RateLimited> for ApiError {
    fn from(limited: RateLimited) -> Self {
        Self::TooManyRequests(limited)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        error!(?error, "Received error.");

        Self::InternalServerError
    }
}

/// Invalid emails and passwords have field-level representations that the
/// handlers build themselves. Reaching this conversion with one of them is a
/// bug, so they are reported like any other unexpected error.
impl From<RecoveryError> for ApiError {
    fn from(error: RecoveryError) -> Self {
        match error {
            RecoveryError::RateLimited => RateLimited.into(),
            RecoveryError::InvalidToken => Self::BadRequestReason(INVALID_TOKEN_MESSAGE.to_owned()),
            RecoveryError::Other(error) => error.into(),
            unexpected @ (RecoveryError::InvalidEmail(_) | RecoveryError::InvalidPassword(_)) => {
                anyhow::Error::new(unexpected).into()
            }
        }
    }
}

pub type ApiResponse<T> = Result<T, ApiError>;
