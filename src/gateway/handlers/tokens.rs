use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{error_response, BrokerState};
use crate::credentials::types::{ErrorResponse, OkResponse, SetTokensRequest};

#[utoipa::path(
    post,
    path = "/api/auth/set-tokens",
    request_body = SetTokensRequest,
    responses(
        (status = 200, description = "Credential cookies set", body = OkResponse),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
    ),
    tag = "broker"
)]
#[instrument(skip_all)]
pub async fn set_tokens(
    state: Extension<Arc<BrokerState>>,
    payload: Option<Json<SetTokensRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid payload");
    };

    if request.refresh_token.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing refresh token");
    }

    let access = request
        .access_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(|token| (token, request.expires_in));

    match state.credential_cookies(access, &request.refresh_token) {
        Ok(headers) => {
            debug!("Credential cookies issued");
            (StatusCode::OK, headers, Json(OkResponse::ok())).into_response()
        }
        Err(response) => response,
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/clear-tokens",
    responses(
        (status = 200, description = "Credential cookies expired", body = OkResponse),
    ),
    tag = "broker"
)]
#[instrument(skip_all)]
pub async fn clear_tokens(state: Extension<Arc<BrokerState>>) -> impl IntoResponse {
    debug!("Clearing credential cookies");
    (StatusCode::OK, state.expired_cookies(), Json(OkResponse::ok()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::backend::{BackendClient, BackendConfig};
    use axum::{
        body::Body,
        http::{header::SET_COOKIE, Request},
        routing::post,
        Router,
    };
    use tower::ServiceExt;
    use url::Url;

    fn app(secure: bool) -> Router {
        let backend =
            BackendClient::new(&BackendConfig::new(Url::parse("http://127.0.0.1:9").unwrap()))
                .unwrap();
        Router::new()
            .route("/api/auth/set-tokens", post(set_tokens))
            .route("/api/auth/clear-tokens", post(clear_tokens))
            .layer(Extension(Arc::new(BrokerState::new(backend, secure))))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn set_tokens_sets_both_cookies() {
        let response = post_json(
            app(false),
            "/api/auth/set-tokens",
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":10}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        let refresh = cookies.iter().find(|c| c.starts_with("refresh_token=r1")).unwrap();
        assert!(refresh.contains("HttpOnly"));
        assert!(refresh.contains("Max-Age=2592000"));
        let access = cookies.iter().find(|c| c.starts_with("access_token=a1")).unwrap();
        assert!(access.contains("Max-Age=60"));
        assert!(!access.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn set_tokens_without_access_sets_refresh_only() {
        let response = post_json(
            app(true),
            "/api/auth/set-tokens",
            r#"{"refresh_token":"r1","expires_in":900}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("refresh_token=r1"));
        assert!(cookies[0].contains("Secure"));
    }

    #[tokio::test]
    async fn set_tokens_rejects_malformed_payloads() {
        for body in [
            "not json",
            r#"{"access_token":"a1","expires_in":900}"#,
            r#"{"refresh_token":"","expires_in":900}"#,
            r#"{"refresh_token":"r1"}"#,
            r#"{"refresh_token":"r1","expires_in":"soon"}"#,
        ] {
            let response = post_json(app(false), "/api/auth/set-tokens", body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert!(set_cookies(&response).is_empty());
        }
    }

    #[tokio::test]
    async fn clear_tokens_always_expires_both() {
        let response = post_json(app(false), "/api/auth/clear-tokens", "").await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        for cookie in &cookies {
            assert!(cookie.contains("=;"));
            assert!(cookie.contains("Max-Age=0"));
            assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        }
    }
}
