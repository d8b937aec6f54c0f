pub mod health;
pub use self::health::health;

pub mod pages;
pub use self::pages::page_shell;

pub mod refresh;
pub use self::refresh::refresh;

pub mod tokens;
pub use self::tokens::{clear_tokens, set_tokens};

// common functions for the handlers
use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use super::backend::BackendClient;
use crate::credentials::{
    cookies::{access_cookie, expired_cookie, refresh_cookie},
    types::ErrorResponse,
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME,
};

/// State shared by the broker routes.
#[derive(Clone, Debug)]
pub struct BrokerState {
    pub backend: BackendClient,
    pub secure_cookies: bool,
}

impl BrokerState {
    #[must_use]
    pub fn new(backend: BackendClient, secure_cookies: bool) -> Self {
        Self {
            backend,
            secure_cookies,
        }
    }

    /// `Set-Cookie` headers for a token pair. `access` is optional because
    /// set-tokens accepts a refresh token on its own.
    fn credential_cookies(
        &self,
        access: Option<(&str, i64)>,
        refresh: &str,
    ) -> Result<HeaderMap, Response> {
        let mut headers = HeaderMap::new();
        let refresh = refresh_cookie(refresh, self.secure_cookies).map_err(|err| {
            error!("Failed to build refresh cookie: {err}");
            error_response(StatusCode::BAD_REQUEST, "Invalid refresh token")
        })?;
        headers.append(SET_COOKIE, refresh);

        if let Some((token, expires_in)) = access {
            let access = access_cookie(token, expires_in, self.secure_cookies).map_err(|err| {
                error!("Failed to build access cookie: {err}");
                error_response(StatusCode::BAD_REQUEST, "Invalid access token")
            })?;
            headers.append(SET_COOKIE, access);
        }

        Ok(headers)
    }

    /// `Set-Cookie` headers expiring both credentials.
    fn expired_cookies(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, http_only) in [(ACCESS_COOKIE_NAME, false), (REFRESH_COOKIE_NAME, true)] {
            match expired_cookie(name, http_only, self.secure_cookies) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(err) => error!("Failed to build expired {name} cookie: {err}"),
            }
        }
        headers
    }
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}
