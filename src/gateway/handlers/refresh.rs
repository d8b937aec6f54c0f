use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{error_response, BrokerState};
use crate::{
    credentials::{
        cookies::get_cookie,
        types::{ErrorResponse, RefreshedAccess},
        REFRESH_COOKIE_NAME,
    },
    gateway::backend::BackendError,
};

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Credential pair rotated", body = RefreshedAccess),
        (status = 401, description = "No refresh cookie, or the backend rejected it", body = ErrorResponse),
        (status = 403, description = "Backend rejected the refresh token", body = ErrorResponse),
        (status = 502, description = "Backend unreachable or returned an incomplete token set", body = ErrorResponse),
    ),
    tag = "broker"
)]
#[instrument(skip_all)]
pub async fn refresh(headers: HeaderMap, state: Extension<Arc<BrokerState>>) -> Response {
    let Some(refresh_token) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        debug!("Refresh without refresh cookie");
        return error_response(StatusCode::UNAUTHORIZED, "No refresh token");
    };

    let tokens = match state.backend.refresh(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(BackendError::Rejected { status }) => {
            warn!("Backend rejected refresh token: {status}");
            let message = "Refresh token rejected";
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                let expired = state.expired_cookies();
                return (status, expired, Json(ErrorResponse::new(message))).into_response();
            }
            return error_response(status, message);
        }
        Err(err @ BackendError::Malformed) => {
            error!("{err}");
            return error_response(StatusCode::BAD_GATEWAY, "Invalid refresh response");
        }
        Err(err @ BackendError::Unreachable(_)) => {
            error!("{err}");
            return error_response(StatusCode::BAD_GATEWAY, "Authorization backend unavailable");
        }
    };

    match state.credential_cookies(
        Some((&tokens.access_token, tokens.expires_in)),
        &tokens.refresh_token,
    ) {
        Ok(cookies) => {
            debug!("Credential pair rotated");
            let body = RefreshedAccess {
                access_token: tokens.access_token,
                expires_in: tokens.expires_in,
            };
            (StatusCode::OK, cookies, Json(body)).into_response()
        }
        Err(_) => error_response(StatusCode::BAD_GATEWAY, "Invalid refresh response"),
    }
}
