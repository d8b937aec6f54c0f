//! Login, registration and logout against the remote backend.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use super::{errors::ClientError, http::ApiClient};
use crate::{credentials::TokenResponse, session::UserProfile};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CURRENT_USER_PATH: &str = "/auth/me";

#[derive(Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: SecretString,
    pub name: Option<String>,
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl ApiClient {
    /// Exchange email and password for a session.
    ///
    /// # Errors
    /// Returns an error if the backend refuses the credentials or the user
    /// profile cannot be loaded afterwards.
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserProfile, ClientError> {
        let body = CredentialsBody {
            email,
            password: password.expose_secret(),
            name: None,
        };
        self.issue(LOGIN_PATH, &body).await
    }

    /// # Errors
    /// Returns an error if the backend refuses the registration or the user
    /// profile cannot be loaded afterwards.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile, ClientError> {
        let body = CredentialsBody {
            email: &request.email,
            password: request.password.expose_secret(),
            name: request.name.as_deref(),
        };
        self.issue(REGISTER_PATH, &body).await
    }

    /// End the session. Local state is cleared even if the backend call fails.
    pub async fn logout(&self) {
        if let Err(err) = self.post_empty(LOGOUT_PATH).await {
            debug!("Backend logout failed, clearing local session anyway: {err}");
        }
        self.credentials().clear_credentials().await;
        self.session().logout();
        info!("Logged out");
    }

    /// # Errors
    /// Returns an error if the profile cannot be fetched.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        self.get_json(CURRENT_USER_PATH).await
    }

    async fn issue(
        &self,
        path: &str,
        body: &CredentialsBody<'_>,
    ) -> Result<UserProfile, ClientError> {
        self.session().set_loading(true);
        let result = self.establish(path, body).await;
        self.session().set_loading(false);
        result
    }

    async fn establish(
        &self,
        path: &str,
        body: &CredentialsBody<'_>,
    ) -> Result<UserProfile, ClientError> {
        let tokens: TokenResponse = self.post_json_unauthenticated(path, body).await?;
        self.credentials().set_credentials(&tokens).await;

        let user = self.current_user().await?;
        self.session().set_authenticated(user.clone());
        info!("Signed in as {}", user.email);
        Ok(user)
    }
}
