//! Shared HTTP client for backend calls.
//!
//! Every request gets the access token as a bearer credential. A `401` is
//! handed to the refresh coordinator: the first one starts a refresh through
//! the broker, concurrent ones wait for it, and each request is replayed at
//! most once with the new token. A failed refresh is terminal: the access
//! credential and the persisted session are dropped and the navigator is sent
//! to the login page before any waiter sees the error. The refresh credential
//! is cleared through the broker afterwards.

use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Method, Request, RequestBuilder, Response, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};

use super::{
    broker::BrokerClient,
    coordinator::{RefreshCoordinator, RefreshOutcome},
    errors::{map_request_error, ClientError, RefreshError},
    navigator::Navigator,
};
use crate::{
    config::{Environment, RuntimeMode},
    credentials::{CredentialStore, SessionJar},
    session::{SessionMirror, SessionStorage},
    APP_USER_AGENT,
};

/// Upper bound for every outbound call, broker calls included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Remote backend, e.g. `https://api.example.com/v1`.
    pub backend_base_url: Url,
    /// Gateway origin hosting the broker routes.
    pub app_origin: Url,
    pub login_path: String,
    pub timeout: Duration,
    pub environment: Environment,
    pub mode: RuntimeMode,
}

impl ClientConfig {
    #[must_use]
    pub fn new(backend_base_url: Url, app_origin: Url) -> Self {
        Self {
            backend_base_url,
            app_origin,
            login_path: "/login".to_string(),
            timeout: DEFAULT_TIMEOUT,
            environment: Environment::Production,
            mode: RuntimeMode::Normal,
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// The mode is checked against the environment in [`ApiClient::new`].
    #[must_use]
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Process-wide client. Clones share the jar, the coordinator and the mirror.
#[derive(Clone, Debug)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: Url,
    login_path: String,
    credentials: CredentialStore,
    session: SessionMirror,
    coordinator: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    /// Build the client, load persisted cookies and rehydrate the session
    /// mirror from `storage`.
    ///
    /// # Errors
    /// Returns an error if the mode is not allowed in the configured
    /// environment or the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        config
            .mode
            .check(config.environment)
            .map_err(|err| ClientError::Config(err.to_string()))?;

        let jar = Arc::new(SessionJar::persistent(
            config.app_origin.clone(),
            storage.clone(),
        ));
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|err| ClientError::Config(format!("Failed to build HTTP client: {err}")))?;

        let credentials =
            CredentialStore::new(jar, BrokerClient::new(http.clone(), config.app_origin));
        let session = SessionMirror::new(storage, &config.mode);
        session.rehydrate(&credentials);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.backend_base_url,
                login_path: config.login_path,
                credentials,
                session,
                coordinator: RefreshCoordinator::new(),
                navigator,
            }),
        })
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    #[must_use]
    pub fn session(&self) -> &SessionMirror {
        &self.inner.session
    }

    /// Start a request against the backend base URL.
    ///
    /// # Errors
    /// Returns an error if `path` does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.inner.http.request(method, self.url(path)?))
    }

    /// Send a request through the bearer and refresh stages.
    ///
    /// Non-`401` responses are returned as is, error statuses included. A
    /// request whose body cannot be cloned is never replayed; its `401` is
    /// returned unchanged.
    ///
    /// # Errors
    /// Returns a transport error, or [`ClientError::Refresh`] when the
    /// credential pair could not be rotated.
    pub async fn execute(&self, mut request: Request) -> Result<Response, ClientError> {
        let replay = request.try_clone();
        let sent_token = self.authorize(&mut request);

        let response = self.send(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(mut replay) = replay else {
            debug!("Request body cannot be replayed, returning 401");
            return Ok(response);
        };

        let token = self.refresh_access(sent_token.as_deref()).await?;
        set_bearer(&mut replay, &token);

        // the replay is the retried attempt: a second 401 goes back to the caller
        self.send(replay).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-success status or an
    /// undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.build(self.request(Method::GET, path)?)?;
        handle_json_response(self.execute(request).await?).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-success status or an
    /// undecodable body.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let request = self.build(self.request(Method::POST, path)?.json(body))?;
        handle_json_response(self.execute(request).await?).await
    }

    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn post_empty(&self, path: &str) -> Result<(), ClientError> {
        let request = self.build(self.request(Method::POST, path)?)?;
        handle_empty_response(self.execute(request).await?).await
    }

    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let request = self.build(self.request(Method::DELETE, path)?)?;
        handle_empty_response(self.execute(request).await?).await
    }

    /// Send without the bearer and refresh stages. Used by the credential
    /// issuing endpoints, where a `401` means bad input rather than expiry.
    pub(crate) async fn post_json_unauthenticated<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let request = self.build(self.request(Method::POST, path)?.json(body))?;
        handle_json_response(self.send(request).await?).await
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = path.trim().trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|err| ClientError::Config(format!("Invalid request URL: {err}")))
    }

    fn build(&self, builder: RequestBuilder) -> Result<Request, ClientError> {
        builder
            .build()
            .map_err(|err| ClientError::Serialization(format!("Failed to build request: {err}")))
    }

    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.inner
            .http
            .execute(request)
            .await
            .map_err(|err| map_request_error(&err))
    }

    /// Attach the current access token, returning the token that was sent.
    fn authorize(&self, request: &mut Request) -> Option<String> {
        let token = self.inner.credentials.get_access_credential()?;
        set_bearer(request, &token).then_some(token)
    }

    async fn refresh_access(&self, sent_token: Option<&str>) -> Result<String, RefreshError> {
        let ticket = self.inner.coordinator.join(sent_token).await;
        if ticket.is_start() {
            let client = self.clone();
            // detached so a cancelled caller cannot leave the coordinator refreshing
            tokio::spawn(async move { client.run_refresh().await });
        }
        ticket.outcome().await
    }

    async fn run_refresh(self) {
        let worker = self.clone();
        let outcome = match tokio::spawn(async move { worker.rotate().await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Refresh task failed: {err}");
                Err(RefreshError::Abandoned)
            }
        };

        let inner = &self.inner;
        match outcome {
            Ok(token) => {
                let notified = inner.coordinator.settle(Ok(token)).await;
                debug!("Refresh succeeded, resumed {notified} request(s)");
            }
            Err(err) => {
                // local state is gone before any waiter observes the failure
                inner.credentials.remove_access_credential();
                inner.session.discard();
                inner.navigator.navigate(&inner.login_path);

                let notified = inner.coordinator.settle(Err(err.clone())).await;
                match &err {
                    RefreshError::Rejected(_) => {
                        warn!("Refresh rejected, ending session ({notified} request(s) failed): {err}");
                    }
                    _ => {
                        error!("Refresh failed, ending session ({notified} request(s) failed): {err}");
                    }
                }

                inner.credentials.clear_refresh_credential().await;
            }
        }
    }

    async fn rotate(&self) -> RefreshOutcome {
        let refreshed = self.inner.credentials.broker().refresh().await?;
        self.inner
            .credentials
            .set_access_credential(&refreshed.access_token, refreshed.expires_in);
        Ok(refreshed.access_token)
    }
}

fn set_bearer(request: &mut Request, token: &str) -> bool {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
            true
        }
        Err(err) => {
            warn!("Access token is not a valid header value: {err}");
            false
        }
    }
}

/// Parses JSON responses and surfaces HTTP errors with sanitized bodies.
async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Parse(format!("Failed to decode response: {err}")))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Http {
            status: status.as_u16(),
            message: sanitize_body(&body),
        })
    }
}

async fn handle_empty_response(response: Response) -> Result<(), ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Http {
            status: status.as_u16(),
            message: sanitize_body(&body),
        })
    }
}

/// Trims and truncates error bodies before they reach callers.
pub(crate) fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{client::navigator::BroadcastNavigator, session::MemoryStorage};

    fn client(base: &str) -> ApiClient {
        let config = ClientConfig::new(
            Url::parse(base).unwrap(),
            Url::parse("http://127.0.0.1:9").unwrap(),
        );
        ApiClient::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(BroadcastNavigator::default()),
        )
        .unwrap()
    }

    #[test]
    fn sanitize_body_trims_and_truncates() {
        assert_eq!(sanitize_body("   "), "Request failed.");
        assert_eq!(sanitize_body("  nope \n"), "nope");
        assert_eq!(sanitize_body(&"x".repeat(500)).len(), MAX_ERROR_CHARS);
    }

    #[test]
    fn url_joins_base_path_and_request_path() {
        let client = client("http://api.localhost:8000/v1/");
        assert_eq!(
            client.url("/auth/me").unwrap().as_str(),
            "http://api.localhost:8000/v1/auth/me"
        );
        assert_eq!(
            client.url("jobs?page=2").unwrap().as_str(),
            "http://api.localhost:8000/v1/jobs?page=2"
        );
    }

    #[test]
    fn bearer_attached_only_with_access_credential() {
        let client = client("http://api.localhost:8000");
        let mut request = client
            .build(client.request(Method::GET, "/auth/me").unwrap())
            .unwrap();
        assert_eq!(client.authorize(&mut request), None);
        assert!(request.headers().get(AUTHORIZATION).is_none());

        client.credentials().set_access_credential("a1", 900);
        assert_eq!(client.authorize(&mut request), Some("a1".to_string()));
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer a1");
    }

    #[test]
    fn config_builders() {
        let config = ClientConfig::new(
            Url::parse("http://api.localhost").unwrap(),
            Url::parse("http://app.localhost").unwrap(),
        )
        .with_login_path("/signin")
        .with_timeout(Duration::from_secs(5))
        .with_environment(Environment::Development)
        .with_mode(RuntimeMode::DevBypass);

        assert_eq!(config.login_path, "/signin");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.mode.is_dev_bypass());

        let client = ApiClient::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(BroadcastNavigator::default()),
        )
        .unwrap();
        assert!(client.session().is_authenticated());
    }

    #[test]
    fn dev_bypass_is_refused_in_production() {
        let config = ClientConfig::new(
            Url::parse("http://api.localhost").unwrap(),
            Url::parse("http://app.localhost").unwrap(),
        )
        .with_mode(RuntimeMode::DevBypass);
        assert_eq!(config.environment, Environment::Production);

        let result = ApiClient::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(BroadcastNavigator::default()),
        );
        assert!(matches!(result, Err(ClientError::Config(message)) if message.contains("production")));
    }
}
