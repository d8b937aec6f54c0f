//! Persisted mirror of the signed-in user.
//!
//! The mirror only exists so a restart can paint the last known session
//! without a network round trip. It never holds a credential; the access
//! cookie stays the source of truth and rehydration corrects the mirror when
//! the cookie has gone away.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::storage::SessionStorage;
use crate::{config::RuntimeMode, credentials::CredentialStore};

/// Storage key of the persisted mirror.
pub const SESSION_STORAGE_KEY: &str = "auth-storage";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserProfile {
    /// Fixed identity used by the development auth bypass.
    #[must_use]
    pub fn development() -> Self {
        Self {
            id: "dev-user".to_string(),
            email: "dev@localhost".to_string(),
            name: Some("Development User".to_string()),
            role: Some("admin".to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

/// Persisted subset of [`SessionState`]; loading is never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl From<&SessionState> for PersistedSession {
    fn from(state: &SessionState) -> Self {
        Self {
            user: state.user.clone(),
            is_authenticated: state.is_authenticated,
        }
    }
}

#[derive(Debug)]
pub struct SessionMirror {
    storage: Arc<dyn SessionStorage>,
    state: RwLock<SessionState>,
    dev_override: bool,
}

impl SessionMirror {
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, mode: &RuntimeMode) -> Self {
        let dev_override = mode.is_dev_bypass();
        if dev_override {
            warn!("DEV AUTH BYPASS ACTIVE: session mirror reports a fixed fake user");
        }
        Self {
            storage,
            state: RwLock::new(SessionState::default()),
            dev_override,
        }
    }

    /// Current state. Under the dev bypass this is always the fake session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.dev_override {
            return SessionState {
                user: Some(UserProfile::development()),
                is_authenticated: true,
                is_loading: false,
            };
        }
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.state().user
    }

    /// Load the persisted mirror and correct it against the credential store.
    /// Returns `true` when a stale authenticated mirror was reset. Running it
    /// again without new credentials changes nothing.
    pub fn rehydrate(&self, credentials: &CredentialStore) -> bool {
        let persisted = self.load();
        let mut state = self.write();
        state.user = persisted.user;
        state.is_authenticated = persisted.is_authenticated;
        state.is_loading = false;

        if state.is_authenticated && !credentials.has_credentials() {
            info!("Persisted session has no access credential, resetting to logged out");
            state.user = None;
            state.is_authenticated = false;
            self.persist(&state);
            return true;
        }
        false
    }

    pub fn set_authenticated(&self, user: UserProfile) {
        let mut state = self.write();
        state.user = Some(user);
        state.is_authenticated = true;
        state.is_loading = false;
        self.persist(&state);
    }

    pub fn set_loading(&self, loading: bool) {
        self.write().is_loading = loading;
    }

    /// Reset to logged out and persist the logged-out state.
    pub fn logout(&self) {
        let mut state = self.write();
        *state = SessionState::default();
        self.persist(&state);
    }

    /// Reset to logged out and delete the persisted copy.
    pub fn discard(&self) {
        *self.write() = SessionState::default();
        if let Err(err) = self.storage.remove(SESSION_STORAGE_KEY) {
            warn!("Failed to discard persisted session: {err}");
        }
    }

    fn load(&self) -> PersistedSession {
        match self.storage.get(SESSION_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("Ignoring unreadable persisted session: {err}");
                PersistedSession::default()
            }),
            Ok(None) => PersistedSession::default(),
            Err(err) => {
                warn!("Failed to load persisted session: {err}");
                PersistedSession::default()
            }
        }
    }

    fn persist(&self, state: &SessionState) {
        let persisted = PersistedSession::from(state);
        let raw = match serde_json::to_string(&persisted) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to encode session: {err}");
                return;
            }
        };
        match self.storage.set(SESSION_STORAGE_KEY, &raw) {
            Ok(()) => debug!("Session persisted"),
            Err(err) => warn!("Failed to persist session: {err}"),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
