mod sliding_window;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub use self::sliding_window::{SlidingWindowLimiter, DEFAULT_MAX_KEYS};

/// A per-key request gate.
pub trait RateLimiter: Send + Sync {
    /// Determine if a request for `key` may proceed.
    ///
    /// # Arguments
    ///
    /// * `key` - A unique key for the actor being limited, such as an email
    ///   address or a client's IP address.
    ///
    /// # Returns
    ///
    /// `true` if the request is allowed, in which case it counts against the
    /// key's limit. `false` if the key is over its limit; rejected requests
    /// are not counted.
    fn allow_request(&self, key: &str) -> bool;
}

pub type DynRateLimiter = Arc<dyn RateLimiter>;

/// Marker for a request rejected by a rate limiter.
///
/// Every limiter produces the same response so a client can't tell which gate
/// rejected it.
#[derive(Clone, Copy, Debug, Default)]
pub struct RateLimited;

#[derive(Serialize)]
pub struct RateLimitResponse {
    pub message: String,
}

impl From<RateLimited> for RateLimitResponse {
    fn from(_: RateLimited) -> Self {
        Self {
            message: "Too many attempts. Please try again later.".to_string(),
        }
    }
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitResponse::from(self)),
        )
            .into_response()
    }
}
