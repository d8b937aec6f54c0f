//! Outbound calls from the gateway to the remote authorization backend.
//!
//! Only connect failures are retried: a request that reached the backend may
//! already have consumed a rotate-on-use refresh token, so timeouts and
//! rejections are final.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{credentials::TokenResponse, APP_USER_AGENT};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(200);
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authorization backend unreachable: {0}")]
    Unreachable(String),
    #[error("authorization backend rejected the refresh token ({status})")]
    Rejected { status: StatusCode },
    #[error("authorization backend returned an incomplete token set")]
    Malformed,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: Url,
    refresh_path: String,
    timeout: Duration,
    retry_attempts: u32,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            refresh_path: "/auth/refresh".to_string(),
            timeout: Duration::from_secs(30),
            retry_attempts: 0,
        }
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout = Duration::from_secs(seconds.max(1));
        self
    }

    /// Extra attempts after a connect failure. Zero disables retries.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    fn refresh_url(&self) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = self.refresh_path.trim().trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .with_context(|| format!("Invalid backend refresh URL: {base}/{path}"))
    }
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Token set as the backend sends it; every field is checked before use.
#[derive(Deserialize)]
struct BackendTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl BackendTokens {
    fn complete(self) -> Option<TokenResponse> {
        let access_token = self.access_token.filter(|token| !token.is_empty())?;
        let refresh_token = self.refresh_token.filter(|token| !token.is_empty())?;
        Some(TokenResponse {
            access_token,
            refresh_token,
            // floored to the minimum cookie lifetime when absent
            expires_in: self.expires_in.unwrap_or(0),
            token_type: self.token_type,
        })
    }
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    refresh_url: Url,
    retry_attempts: u32,
}

impl BackendClient {
    /// # Errors
    /// Returns an error if the refresh URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            refresh_url: config.refresh_url()?,
            retry_attempts: config.retry_attempts,
        })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// # Errors
    /// Returns [`BackendError::Rejected`] with the backend status on any
    /// non-success answer, [`BackendError::Malformed`] if either token is
    /// missing, and [`BackendError::Unreachable`] on transport failure.
    #[instrument(skip_all, fields(url = %self.refresh_url))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, BackendError> {
        let mut attempt = 0;
        let response = loop {
            let sent = self
                .http
                .post(self.refresh_url.clone())
                .json(&RefreshBody { refresh_token })
                .send()
                .await;

            match sent {
                Ok(response) => break response,
                Err(err) if err.is_connect() && attempt < self.retry_attempts => {
                    attempt += 1;
                    let delay = backoff_delay(attempt, RETRY_BACKOFF_BASE, RETRY_BACKOFF_MAX);
                    warn!(
                        "Backend connect failed (attempt {attempt}/{}), retrying in {}ms: {err}",
                        self.retry_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(BackendError::Unreachable(err.to_string())),
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("Backend refresh answered {status}");
            return Err(BackendError::Rejected { status });
        }

        let tokens: BackendTokens = response
            .json()
            .await
            .map_err(|_| BackendError::Malformed)?;

        tokens.complete().ok_or(BackendError::Malformed)
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
