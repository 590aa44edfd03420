use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::{
    client_ip::ClientIp,
    http_err::ApiResponse,
    recovery::{RecoveryError, RecoveryService},
    server::AppState,
};

pub mod reps;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/password-reset-requests", post(create_password_reset_request))
        .route("/password-resets", post(complete_password_reset))
        .route("/password-resets/:token", get(check_password_reset))
}

pub enum CreatePasswordResetResponse {
    Accepted(reps::PasswordResetRequestAccepted),
    BadRequest(reps::PasswordResetRequestError),
}

impl IntoResponse for CreatePasswordResetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(rep) => (StatusCode::ACCEPTED, Json(rep)).into_response(),
            Self::BadRequest(rep) => (StatusCode::BAD_REQUEST, Json(rep)).into_response(),
        }
    }
}

async fn create_password_reset_request(
    State(recovery): State<RecoveryService>,
    ClientIp(client_ip): ClientIp,
    Json(request): Json<reps::PasswordResetRequest>,
) -> ApiResponse<CreatePasswordResetResponse> {
    match recovery.request_reset(&client_ip, &request.email).await {
        Ok(()) => Ok(CreatePasswordResetResponse::Accepted(Default::default())),
        Err(RecoveryError::InvalidEmail(invalidity)) => {
            Ok(CreatePasswordResetResponse::BadRequest(invalidity.into()))
        }
        Err(error) => Err(error.into()),
    }
}

async fn check_password_reset(
    State(recovery): State<RecoveryService>,
    Path(token): Path<String>,
) -> ApiResponse<StatusCode> {
    recovery.check_token(&token)?;

    Ok(StatusCode::NO_CONTENT)
}

pub enum CompletePasswordResetResponse {
    Completed,
    BadRequest(reps::PasswordResetError),
}

impl IntoResponse for CompletePasswordResetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Completed => StatusCode::NO_CONTENT.into_response(),
            Self::BadRequest(rep) => (StatusCode::BAD_REQUEST, Json(rep)).into_response(),
        }
    }
}

async fn complete_password_reset(
    State(recovery): State<RecoveryService>,
    Json(reset): Json<reps::PasswordReset>,
) -> ApiResponse<CompletePasswordResetResponse> {
    match recovery
        .complete_reset(&reset.token, &reset.new_password)
        .await
    {
        Ok(()) => Ok(CompletePasswordResetResponse::Completed),
        Err(RecoveryError::InvalidToken) => Ok(CompletePasswordResetResponse::BadRequest(
            reps::PasswordResetError::invalid_token(),
        )),
        Err(RecoveryError::InvalidPassword(context)) => {
            Ok(CompletePasswordResetResponse::BadRequest(context.into()))
        }
        Err(error) => Err(error.into()),
    }
}

async fn health(State(recovery): State<RecoveryService>) -> Json<reps::Health> {
    let store = recovery.token_store();

    Json(reps::Health {
        status: "ok".to_owned(),
        tokens: store.count(),
        full: store.is_full(),
    })
}
