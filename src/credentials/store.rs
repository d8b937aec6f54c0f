//! Access to the credential pair from application code.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    cookies::{access_max_age, ACCESS_COOKIE_NAME, ADMIN_COOKIE_NAME},
    jar::SessionJar,
    types::TokenResponse,
};
use crate::client::broker::BrokerClient;

/// Reads the access credential and writes the pair through the broker routes.
///
/// The refresh credential is never readable here: the broker sets it as an
/// `HttpOnly` cookie and only the transport replays it to the gateway.
#[derive(Debug)]
pub struct CredentialStore {
    jar: Arc<SessionJar>,
    broker: BrokerClient,
}

impl CredentialStore {
    #[must_use]
    pub fn new(jar: Arc<SessionJar>, broker: BrokerClient) -> Self {
        Self { jar, broker }
    }

    #[must_use]
    pub fn get_access_credential(&self) -> Option<String> {
        self.jar.readable(ACCESS_COOKIE_NAME)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.get_access_credential().is_some()
    }

    /// Store a freshly issued token pair.
    ///
    /// The access cookie is written first; if the broker call fails the
    /// session stays usable until the access token needs refreshing.
    pub async fn set_credentials(&self, tokens: &TokenResponse) {
        self.set_access_credential(&tokens.access_token, tokens.expires_in);

        if let Err(err) = self.broker.set_tokens(tokens).await {
            warn!("Failed to store refresh credential, session will not survive expiry: {err}");
        }
    }

    /// Forget both credentials. The local cookie goes first so callers observe
    /// the logout even when the broker is slow or down.
    pub async fn clear_credentials(&self) {
        self.remove_access_credential();
        self.clear_refresh_credential().await;
    }

    pub fn set_admin_marker(&self) {
        self.jar.set_readable(ADMIN_COOKIE_NAME, "true", None);
    }

    pub fn clear_admin_marker(&self) {
        self.jar.remove_readable(ADMIN_COOKIE_NAME);
    }

    #[must_use]
    pub fn has_admin_marker(&self) -> bool {
        self.jar.readable(ADMIN_COOKIE_NAME).is_some()
    }

    pub(crate) fn set_access_credential(&self, token: &str, expires_in: i64) {
        self.jar
            .set_readable(ACCESS_COOKIE_NAME, token, Some(access_max_age(expires_in)));
    }

    pub(crate) fn remove_access_credential(&self) {
        self.jar.remove_readable(ACCESS_COOKIE_NAME);
    }

    pub(crate) async fn clear_refresh_credential(&self) {
        match self.broker.clear_tokens().await {
            Ok(()) => debug!("Refresh credential cleared"),
            Err(err) => warn!("Failed to clear refresh credential: {err}"),
        }
    }

    pub(crate) fn broker(&self) -> &BrokerClient {
        &self.broker
    }
}
