//! Edge route guard.
//!
//! Runs before every page request and redirects on cookie presence alone. It
//! never validates a token: the backend checks the bearer credential on every
//! API call, this only keeps users off pages they cannot use.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use url::form_urlencoded;

use crate::{
    config::ConfigError,
    credentials::{cookies::has_cookie, ACCESS_COOKIE_NAME, ADMIN_COOKIE_NAME},
};

/// Query parameter carrying the page to return to after login.
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Path prefixes per route class, as configured on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    pub protected: Vec<String>,
    pub auth_only: Vec<String>,
    pub admin_prefix: String,
    pub admin_login_path: String,
    pub login_path: String,
    pub landing_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            protected: ["/dashboard", "/translate", "/batches", "/api-keys", "/settings"]
                .map(String::from)
                .to_vec(),
            auth_only: ["/login", "/signup", "/forgot-password"]
                .map(String::from)
                .to_vec(),
            admin_prefix: "/admin".to_string(),
            admin_login_path: "/admin/login".to_string(),
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteClass {
    AdminLogin,
    Admin,
    AuthOnly,
    Protected,
    Public,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Redirect(String),
}

/// Compiled route classes.
#[derive(Clone, Debug)]
pub struct RouteRules {
    protected: Vec<Regex>,
    auth_only: Vec<Regex>,
    admin: Regex,
    admin_prefix: String,
    admin_login_path: String,
    login_path: String,
    landing_path: String,
}

impl RouteRules {
    /// # Errors
    /// Returns an error if any configured path is not absolute.
    pub fn new(config: &RouteConfig) -> Result<Self, ConfigError> {
        let compile_all = |paths: &[String]| -> Result<Vec<Regex>, ConfigError> {
            paths.iter().map(|path| prefix_regex(path)).collect()
        };

        for path in [
            &config.admin_login_path,
            &config.login_path,
            &config.landing_path,
        ] {
            validate_path(path)?;
        }

        Ok(Self {
            protected: compile_all(&config.protected)?,
            auth_only: compile_all(&config.auth_only)?,
            admin: prefix_regex(&config.admin_prefix)?,
            admin_prefix: config.admin_prefix.clone(),
            admin_login_path: config.admin_login_path.clone(),
            login_path: config.login_path.clone(),
            landing_path: config.landing_path.clone(),
        })
    }

    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        if path == self.admin_login_path {
            RouteClass::AdminLogin
        } else if self.admin.is_match(path) {
            RouteClass::Admin
        } else if self.auth_only.iter().any(|re| re.is_match(path)) {
            RouteClass::AuthOnly
        } else if self.protected.iter().any(|re| re.is_match(path)) {
            RouteClass::Protected
        } else {
            RouteClass::Public
        }
    }

    #[must_use]
    pub fn decide(&self, path: &str, query: Option<&str>, headers: &HeaderMap) -> Decision {
        match self.classify(path) {
            RouteClass::AdminLogin if has_cookie(headers, ADMIN_COOKIE_NAME) => {
                Decision::Redirect(self.admin_prefix.clone())
            }
            RouteClass::Admin if !has_cookie(headers, ADMIN_COOKIE_NAME) => {
                Decision::Redirect(self.admin_login_path.clone())
            }
            RouteClass::Protected if !has_cookie(headers, ACCESS_COOKIE_NAME) => {
                let target = match query {
                    Some(query) if !query.is_empty() => format!("{path}?{query}"),
                    _ => path.to_string(),
                };
                Decision::Redirect(self.login_redirect(&target))
            }
            RouteClass::AuthOnly if has_cookie(headers, ACCESS_COOKIE_NAME) => {
                let callback = query.and_then(callback_param);
                Decision::Redirect(sanitize_callback(callback.as_deref(), &self.landing_path))
            }
            _ => Decision::Continue,
        }
    }

    /// Login URL returning to `target`, or to the landing path if `target` is unsafe.
    #[must_use]
    pub fn login_redirect(&self, target: &str) -> String {
        let callback = sanitize_callback(Some(target), &self.landing_path);
        let encoded: String = form_urlencoded::byte_serialize(callback.as_bytes()).collect();
        format!("{}?{CALLBACK_PARAM}={encoded}", self.login_path)
    }
}

/// Accept `target` only as a same-origin relative path, else return `default`.
///
/// Protocol-relative (`//host`), backslash (`/\host`) and absolute URLs are
/// rejected, as is anything with control characters.
#[must_use]
pub fn sanitize_callback(target: Option<&str>, default: &str) -> String {
    match target {
        Some(target) if is_safe_relative(target) => target.to_string(),
        _ => default.to_string(),
    }
}

fn is_safe_relative(target: &str) -> bool {
    let mut chars = target.chars();
    if chars.next() != Some('/') {
        return false;
    }
    if matches!(chars.next(), Some('/' | '\\')) {
        return false;
    }
    !target.chars().any(char::is_control)
}

fn callback_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == CALLBACK_PARAM)
        .map(|(_, value)| value.into_owned())
}

fn validate_path(path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') && !path.starts_with("//") {
        Ok(())
    } else {
        Err(ConfigError::InvalidRoute(path.to_string()))
    }
}

/// `/dashboard` matches `/dashboard` and `/dashboard/x`, not `/dashboards`.
fn prefix_regex(prefix: &str) -> Result<Regex, ConfigError> {
    validate_path(prefix)?;
    let trimmed = prefix.trim_end_matches('/');
    Regex::new(&format!("^{}(?:/|$)", regex::escape(trimmed)))
        .map_err(|_| ConfigError::InvalidRoute(prefix.to_string()))
}

/// Axum middleware applying [`RouteRules::decide`] to every request.
pub async fn route_guard(
    State(rules): State<Arc<RouteRules>>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri();
    match rules.decide(uri.path(), uri.query(), request.headers()) {
        Decision::Continue => next.run(request).await,
        Decision::Redirect(location) => {
            debug!("Guard redirect {} -> {location}", uri.path());
            Redirect::temporary(&location).into_response()
        }
    }
}
