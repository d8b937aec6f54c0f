//! Maintenance gate, replacing the route guard while maintenance is on.

use axum::{
    extract::{Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, RETRY_AFTER, SET_COOKIE},
        HeaderValue, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info};
use url::form_urlencoded;

use crate::credentials::{
    cookies::{has_cookie, maintenance_bypass_cookie},
    MAINTENANCE_BYPASS_COOKIE_NAME,
};

pub const BYPASS_PARAM: &str = "bypass";
const RETRY_AFTER_SECONDS: &str = "3600";

const MAINTENANCE_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Maintenance</title></head>
<body>
<main>
<h1>We'll be right back</h1>
<p>The service is undergoing scheduled maintenance. Please try again shortly.</p>
</main>
</body>
</html>
"#;

#[derive(Debug)]
pub struct MaintenanceGate {
    secret: SecretString,
    secure_cookies: bool,
}

impl MaintenanceGate {
    #[must_use]
    pub fn new(secret: SecretString, secure_cookies: bool) -> Self {
        Self {
            secret,
            secure_cookies,
        }
    }

    fn is_exempt(path: &str) -> bool {
        path == "/health" || path.starts_with("/api/")
    }

    fn matches_secret(&self, candidate: &str) -> bool {
        let expected = self.secret.expose_secret().as_bytes();
        let candidate = candidate.as_bytes();
        // constant time over the candidate length
        expected.len() == candidate.len()
            && expected
                .iter()
                .zip(candidate)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    fn bypass_redirect(&self, uri: &Uri) -> Response {
        let location = strip_bypass_param(uri);
        let cookie = match maintenance_bypass_cookie(self.secure_cookies) {
            Ok(cookie) => cookie,
            Err(err) => {
                error!("Failed to build maintenance bypass cookie: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        let Ok(location) = HeaderValue::from_str(&location) else {
            return StatusCode::BAD_REQUEST.into_response();
        };

        info!("Maintenance bypass granted");
        (
            StatusCode::SEE_OTHER,
            [(LOCATION, location), (SET_COOKIE, cookie)],
        )
            .into_response()
    }
}

/// Axum middleware serving the maintenance page unless bypassed.
pub async fn maintenance_gate(
    State(gate): State<Arc<MaintenanceGate>>,
    request: Request,
    next: Next,
) -> Response {
    if MaintenanceGate::is_exempt(request.uri().path())
        || has_cookie(request.headers(), MAINTENANCE_BYPASS_COOKIE_NAME)
    {
        return next.run(request).await;
    }

    let presented = request.uri().query().and_then(bypass_param);
    if presented.is_some_and(|candidate| gate.matches_secret(&candidate)) {
        return gate.bypass_redirect(request.uri());
    }

    maintenance_page()
}

fn maintenance_page() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS)),
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        MAINTENANCE_PAGE,
    )
        .into_response()
}

fn bypass_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == BYPASS_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Same path and query, minus the bypass parameter.
fn strip_bypass_param(uri: &Uri) -> String {
    let path = uri.path();
    let Some(query) = uri.query() else {
        return path.to_string();
    };

    let remaining: String = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_urlencoded::parse(query.as_bytes()).filter(|(key, _)| key != BYPASS_PARAM))
        .finish();

    if remaining.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{remaining}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        let gate = Arc::new(MaintenanceGate::new(
            SecretString::from("open-sesame".to_string()),
            false,
        ));
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/dashboard", get(|| async { "dashboard" }))
            .route("/health", get(|| async { "ok" }))
            .route("/api/auth/refresh", get(|| async { "broker" }))
            .layer(middleware::from_fn_with_state(gate, maintenance_gate))
    }

    async fn get_status(uri: &str, cookie: Option<&'static str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        app().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn pages_get_503_with_retry_after() {
        let response = get_status("/dashboard", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3600");
    }

    #[tokio::test]
    async fn health_and_api_are_exempt() {
        assert_eq!(get_status("/health", None).await.status(), StatusCode::OK);
        assert_eq!(
            get_status("/api/auth/refresh", None).await.status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn bypass_cookie_passes() {
        let response = get_status("/dashboard", Some("maintenance_bypass=1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bypass_secret_sets_week_long_cookie() {
        let response = get_status("/dashboard?tab=2&bypass=open-sesame", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/dashboard?tab=2");

        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("maintenance_bypass="));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[tokio::test]
    async fn wrong_secret_gets_maintenance_page() {
        let response = get_status("/?bypass=guess", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn strip_bypass_param_keeps_other_params() {
        let uri: Uri = "/x?bypass=s".parse().unwrap();
        assert_eq!(strip_bypass_param(&uri), "/x");
        let uri: Uri = "/x?a=1&bypass=s&b=2".parse().unwrap();
        assert_eq!(strip_bypass_param(&uri), "/x?a=1&b=2");
    }
}
