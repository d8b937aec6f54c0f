//! Credential storage: cookie names and builders, the split-trust jar and the
//! store application code reads the access token from.

pub mod cookies;
pub mod jar;
pub mod store;
pub mod types;

pub use cookies::{
    ACCESS_COOKIE_NAME, ADMIN_COOKIE_NAME, MAINTENANCE_BYPASS_COOKIE_NAME,
    MIN_ACCESS_MAX_AGE_SECONDS, REFRESH_COOKIE_NAME, REFRESH_MAX_AGE_SECONDS,
};
pub use jar::{SessionJar, COOKIE_STORAGE_KEY};
pub use store::CredentialStore;
pub use types::{RefreshedAccess, SetTokensRequest, TokenResponse};

/// Broker route that stores the refresh token as an `HttpOnly` cookie.
pub const SET_TOKENS_ROUTE: &str = "/api/auth/set-tokens";

/// Broker route that rotates the credential pair.
pub const REFRESH_ROUTE: &str = "/api/auth/refresh";

/// Broker route that expires both credential cookies.
pub const CLEAR_TOKENS_ROUTE: &str = "/api/auth/clear-tokens";
