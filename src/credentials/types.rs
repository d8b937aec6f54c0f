//! Wire types shared by the broker routes and the client.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Token tuple issued by the remote backend on login, register and refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Body accepted by `POST /api/auth/set-tokens`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SetTokensRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl From<&TokenResponse> for SetTokensRequest {
    fn from(tokens: &TokenResponse) -> Self {
        Self {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            expires_in: tokens.expires_in,
        }
    }
}

/// Body returned by `POST /api/auth/refresh`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
