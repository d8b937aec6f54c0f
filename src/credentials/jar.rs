//! Split-trust cookie jar for the gateway origin.
//!
//! The jar is the HTTP client's cookie provider: it accepts `Set-Cookie` from
//! the gateway origin and replays every live cookie, `HttpOnly` ones included,
//! on requests back to that origin. Application code can only read cookies
//! that are not `HttpOnly`; the refresh token never leaves the transport.
//!
//! A persistent jar writes every cookie that carries an expiry to its
//! [`SessionStorage`] and loads them back on construction, so credentials
//! survive a restart the way browser cookies survive a reload. Session
//! cookies stay in memory.

use cookie::Cookie;
use reqwest::{cookie::CookieStore, header::HeaderValue, Url};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::session::SessionStorage;

/// Storage key of the persisted cookies.
pub const COOKIE_STORAGE_KEY: &str = "session-cookies";

type Cookies = HashMap<String, StoredCookie>;

#[derive(Clone, Debug)]
struct StoredCookie {
    value: String,
    http_only: bool,
    secure: bool,
    expires_at: Option<OffsetDateTime>,
}

impl StoredCookie {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCookie {
    name: String,
    value: String,
    http_only: bool,
    secure: bool,
    /// Unix timestamp in seconds.
    expires_at: i64,
}

impl PersistedCookie {
    fn restore(self, now: OffsetDateTime) -> Option<(String, StoredCookie)> {
        let expires_at = OffsetDateTime::from_unix_timestamp(self.expires_at).ok()?;
        let cookie = StoredCookie {
            value: self.value,
            http_only: self.http_only,
            secure: self.secure,
            expires_at: Some(expires_at),
        };
        cookie.is_live(now).then_some((self.name, cookie))
    }
}

#[derive(Debug)]
pub struct SessionJar {
    origin: Url,
    cookies: RwLock<Cookies>,
    storage: Option<Arc<dyn SessionStorage>>,
}

impl SessionJar {
    /// In-memory jar; every cookie is lost with the process.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cookies: RwLock::new(HashMap::new()),
            storage: None,
        }
    }

    /// Jar backed by `storage`, loaded with the cookies that are still live.
    #[must_use]
    pub fn persistent(origin: Url, storage: Arc<dyn SessionStorage>) -> Self {
        let cookies = load(storage.as_ref());
        debug!("Loaded {} persisted cookie(s)", cookies.len());
        Self {
            origin,
            cookies: RwLock::new(cookies),
            storage: Some(storage),
        }
    }

    /// Value of a live, non-`HttpOnly` cookie.
    #[must_use]
    pub fn readable(&self, name: &str) -> Option<String> {
        let now = OffsetDateTime::now_utc();
        self.read()
            .get(name)
            .filter(|cookie| !cookie.http_only && cookie.is_live(now))
            .map(|cookie| cookie.value.clone())
    }

    /// Write a readable cookie. `None` keeps it for the lifetime of the jar.
    pub fn set_readable(&self, name: &str, value: &str, max_age_seconds: Option<i64>) {
        let expires_at =
            max_age_seconds.map(|seconds| OffsetDateTime::now_utc() + Duration::seconds(seconds));
        self.update(|cookies| {
            cookies.insert(
                name.to_string(),
                StoredCookie {
                    value: value.to_string(),
                    http_only: false,
                    secure: false,
                    expires_at,
                },
            );
        });
    }

    /// Drop a readable cookie. `HttpOnly` cookies can only be expired by the gateway.
    pub fn remove_readable(&self, name: &str) {
        self.update(|cookies| {
            if cookies.get(name).is_some_and(|cookie| !cookie.http_only) {
                cookies.remove(name);
            }
        });
    }

    fn store(&self, raw: &str, secure_transport: bool) {
        let parsed = match Cookie::parse(raw.to_string()) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("Ignoring malformed Set-Cookie header: {err}");
                return;
            }
        };

        let secure = parsed.secure().unwrap_or(false);
        if secure && !secure_transport {
            debug!("Ignoring secure cookie {} received over http", parsed.name());
            return;
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = match parsed.max_age() {
            Some(max_age) => Some(now + max_age),
            None => parsed.expires_datetime(),
        };

        let name = parsed.name().to_string();
        self.update(|cookies| {
            if parsed.value().is_empty() || expires_at.is_some_and(|at| at <= now) {
                cookies.remove(&name);
                return;
            }

            cookies.insert(
                name,
                StoredCookie {
                    value: parsed.value().to_string(),
                    http_only: parsed.http_only().unwrap_or(false),
                    secure,
                    expires_at,
                },
            );
        });
    }

    /// Apply `change` and write the persistent cookies back while still locked.
    fn update(&self, change: impl FnOnce(&mut Cookies)) {
        let mut cookies = self.write();
        change(&mut cookies);

        if let Some(storage) = &self.storage {
            save(storage.as_ref(), &cookies);
        }
    }

    fn is_gateway(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    fn read(&self) -> RwLockReadGuard<'_, Cookies> {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Cookies> {
        self.cookies.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load(storage: &dyn SessionStorage) -> Cookies {
    let raw = match storage.get(COOKIE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return HashMap::new(),
        Err(err) => {
            warn!("Failed to load persisted cookies: {err}");
            return HashMap::new();
        }
    };

    let persisted: Vec<PersistedCookie> = match serde_json::from_str(&raw) {
        Ok(persisted) => persisted,
        Err(err) => {
            warn!("Ignoring unreadable persisted cookies: {err}");
            return HashMap::new();
        }
    };

    let now = OffsetDateTime::now_utc();
    persisted
        .into_iter()
        .filter_map(|cookie| cookie.restore(now))
        .collect()
}

fn save(storage: &dyn SessionStorage, cookies: &Cookies) {
    let now = OffsetDateTime::now_utc();
    let persisted: Vec<PersistedCookie> = cookies
        .iter()
        .filter(|(_, cookie)| cookie.is_live(now))
        .filter_map(|(name, cookie)| {
            Some(PersistedCookie {
                name: name.clone(),
                value: cookie.value.clone(),
                http_only: cookie.http_only,
                secure: cookie.secure,
                expires_at: cookie.expires_at?.unix_timestamp(),
            })
        })
        .collect();

    let result = if persisted.is_empty() {
        storage.remove(COOKIE_STORAGE_KEY)
    } else {
        match serde_json::to_string(&persisted) {
            Ok(raw) => storage.set(COOKIE_STORAGE_KEY, &raw),
            Err(err) => {
                warn!("Failed to encode cookies: {err}");
                return;
            }
        }
    };

    if let Err(err) = result {
        warn!("Failed to persist cookies: {err}");
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        if !self.is_gateway(url) {
            return;
        }
        let secure_transport = url.scheme() == "https";
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                self.store(raw, secure_transport);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        if !self.is_gateway(url) {
            return None;
        }
        let secure_transport = url.scheme() == "https";
        let now = OffsetDateTime::now_utc();
        let header = self
            .read()
            .iter()
            .filter(|(_, cookie)| cookie.is_live(now) && (secure_transport || !cookie.secure))
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}
