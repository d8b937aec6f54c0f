//! Calls to the gateway broker routes.
//!
//! These requests go through the same cookie jar as everything else, so the
//! `HttpOnly` refresh cookie is replayed to the gateway without application
//! code ever seeing it.

use reqwest::Url;
use tracing::debug;

use super::errors::{map_request_error, ClientError, RefreshError};
use crate::credentials::{
    types::{RefreshedAccess, SetTokensRequest, TokenResponse},
    CLEAR_TOKENS_ROUTE, REFRESH_ROUTE, SET_TOKENS_ROUTE,
};

#[derive(Clone, Debug)]
pub struct BrokerClient {
    http: reqwest::Client,
    origin: Url,
}

impl BrokerClient {
    #[must_use]
    pub fn new(http: reqwest::Client, origin: Url) -> Self {
        Self { http, origin }
    }

    fn url(&self, route: &str) -> Result<Url, ClientError> {
        self.origin
            .join(route)
            .map_err(|err| ClientError::Config(format!("Invalid gateway URL: {err}")))
    }

    /// # Errors
    /// Returns an error if the gateway is unreachable or refuses the payload.
    pub async fn set_tokens(&self, tokens: &TokenResponse) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(SET_TOKENS_ROUTE)?)
            .json(&SetTokensRequest::from(tokens))
            .send()
            .await
            .map_err(|err| map_request_error(&err))?;

        expect_success(response).await
    }

    /// Rotate the credential pair. The refresh cookie rides along in the jar.
    ///
    /// # Errors
    /// Returns `RefreshError` for every outcome that does not yield a new
    /// access token.
    pub async fn refresh(&self) -> Result<RefreshedAccess, RefreshError> {
        let url = self
            .url(REFRESH_ROUTE)
            .map_err(|err| RefreshError::Transport(err.to_string()))?;

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|err| RefreshError::Transport(map_request_error(&err).to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!("Refresh route answered {status}");
            return Err(RefreshError::from_status(status.as_u16()));
        }

        let refreshed = response
            .json::<RefreshedAccess>()
            .await
            .map_err(|_| RefreshError::Malformed)?;

        if refreshed.access_token.is_empty() {
            return Err(RefreshError::Malformed);
        }

        Ok(refreshed)
    }

    /// # Errors
    /// Returns an error if the gateway cannot be reached.
    pub async fn clear_tokens(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(CLEAR_TOKENS_ROUTE)?)
            .send()
            .await
            .map_err(|err| map_request_error(&err))?;

        expect_success(response).await
    }
}

async fn expect_success(response: reqwest::Response) -> Result<(), ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http {
        status: status.as_u16(),
        message: super::http::sanitize_body(&body),
    })
}

