//! # Sessiongate (session broker and token-refreshing API client)
//!
//! `sessiongate` keeps application code talking to a remote backend without
//! ever blocking on, duplicating, or losing track of token refreshes.
//!
//! ## Credentials
//!
//! Two credentials travel as cookies:
//!
//! - **Access token** (`access_token`): short-lived, readable by application
//!   code and attached as `Authorization: Bearer` on every backend call.
//! - **Refresh token** (`refresh_token`): long-lived and `HttpOnly`. Only the
//!   gateway's broker routes read or write it; client code has no accessor.
//!
//! ## Gateway
//!
//! The `sessiongate` binary hosts three broker routes
//! (`/api/auth/set-tokens`, `/api/auth/refresh`, `/api/auth/clear-tokens`),
//! an edge route guard that redirects based on cookie presence, and an
//! optional maintenance gate.
//!
//! ## Client
//!
//! [`client::ApiClient`] injects the access token on every request and, on a
//! `401`, performs a single-flight refresh through the broker: concurrent
//! failures collapse into one refresh call and every waiter observes the same
//! outcome. A failed refresh clears local state and navigates to the login page.

pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod gateway;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
