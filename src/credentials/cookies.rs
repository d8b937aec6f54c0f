//! Cookie names, lifetimes and `Set-Cookie` builders for the credential pair.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

/// Readable cookie holding the short-lived access token.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// `HttpOnly` cookie holding the long-lived refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Session marker for the admin area.
pub const ADMIN_COOKIE_NAME: &str = "admin_authenticated";

/// Set once the maintenance bypass secret has been presented.
pub const MAINTENANCE_BYPASS_COOKIE_NAME: &str = "maintenance_bypass";

/// Lower bound for the access cookie lifetime. A zero or negative `expires_in`
/// would otherwise expire the cookie immediately.
pub const MIN_ACCESS_MAX_AGE_SECONDS: i64 = 60;

pub const REFRESH_MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;

pub const MAINTENANCE_BYPASS_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[must_use]
pub fn access_max_age(expires_in: i64) -> i64 {
    expires_in.max(MIN_ACCESS_MAX_AGE_SECONDS)
}

/// Readable access cookie; the lifetime is floored at one minute.
pub fn access_cookie(
    token: &str,
    expires_in: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = access_max_age(expires_in);
    let mut cookie = format!("{ACCESS_COOKIE_NAME}={token}; Path=/; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `HttpOnly` refresh cookie with a 30 day lifetime.
pub fn refresh_cookie(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={REFRESH_MAX_AGE_SECONDS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn maintenance_bypass_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{MAINTENANCE_BYPASS_COOKIE_NAME}=1; Path=/; HttpOnly; SameSite=Lax; Max-Age={MAINTENANCE_BYPASS_MAX_AGE_SECONDS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Empty value with a past expiry, accepted whether or not the cookie exists.
pub fn expired_cookie(
    name: &str,
    http_only: bool,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}=; Path=/; SameSite=Lax; Max-Age=0; Expires={EXPIRED_DATE}");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read a cookie value from the request `Cookie` header. Empty values count as absent.
#[must_use]
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == name {
                let val = val.trim();
                if val.is_empty() {
                    return None;
                }
                return Some(val.to_string());
            }
        }
    }
    None
}

#[must_use]
pub fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    get_cookie(headers, name).is_some()
}
