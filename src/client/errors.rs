use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ClientError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("Response error: {0}")]
    Parse(String),
    #[error("Request error: {0}")]
    Serialization(String),
    #[error("Session expired: {0}")]
    Refresh(#[from] RefreshError),
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

/// Why the credential pair could not be rotated. Cloned to every waiter.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The broker or the backend refused the refresh credential.
    #[error("refresh rejected ({0})")]
    Rejected(u16),
    /// The broker answered but could not reach a healthy backend.
    #[error("authorization backend unavailable ({0})")]
    Unavailable(u16),
    #[error("refresh response missing token fields")]
    Malformed,
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl RefreshError {
    /// Map a non-success status from the refresh route.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::Unavailable(status)
        } else {
            Self::Rejected(status)
        }
    }
}

/// Maps transport errors with timeout detection.
pub(crate) fn map_request_error(err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        ClientError::Network(format!("Unable to reach the server: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_status_mapping() {
        assert_eq!(RefreshError::from_status(401), RefreshError::Rejected(401));
        assert_eq!(RefreshError::from_status(403), RefreshError::Rejected(403));
        assert_eq!(RefreshError::from_status(502), RefreshError::Unavailable(502));
    }

    #[test]
    fn display_messages() {
        let err = ClientError::Http {
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed (404): not found");
        assert_eq!(err.status(), Some(404));

        let err = ClientError::from(RefreshError::Rejected(401));
        assert_eq!(err.to_string(), "Session expired: refresh rejected (401)");
        assert!(err.is_session_expired());
        assert_eq!(err.status(), None);
    }
}
