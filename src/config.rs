//! Runtime mode selection shared by the gateway and the client.
//!
//! Environment flags are resolved once at startup into a [`RuntimeMode`] so the
//! request path only ever matches on an enum. The development auth bypass can
//! not be constructed under a production environment.

use secrecy::{ExposeSecret, SecretString};
use std::{fmt, str::FromStr};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("development auth bypass must never be enabled in production")]
    DevBypassInProduction,
    #[error("maintenance mode requires a bypass secret")]
    MaintenanceSecretMissing,
    #[error("maintenance mode and development auth bypass are mutually exclusive")]
    ConflictingModes,
    #[error("invalid environment: {0} (expected development or production)")]
    InvalidEnvironment(String),
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid route {0}: routes must be absolute paths")]
    InvalidRoute(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Cookies are only marked `Secure` in production.
    #[must_use]
    pub fn secure_cookies(self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Default)]
pub enum RuntimeMode {
    #[default]
    Normal,
    Maintenance(SecretString),
    DevBypass,
}

impl RuntimeMode {
    /// Resolve startup flags into a single mode.
    ///
    /// # Errors
    /// Returns an error when the dev bypass is requested in production, when
    /// maintenance mode lacks a secret, or when both modes are requested.
    pub fn resolve(
        environment: Environment,
        maintenance: bool,
        maintenance_secret: Option<SecretString>,
        dev_auth_bypass: bool,
    ) -> Result<Self, ConfigError> {
        if dev_auth_bypass {
            Self::DevBypass.check(environment)?;
        }

        if maintenance && dev_auth_bypass {
            return Err(ConfigError::ConflictingModes);
        }

        if maintenance {
            let secret = maintenance_secret
                .filter(|secret| !secret.expose_secret().trim().is_empty())
                .ok_or(ConfigError::MaintenanceSecretMissing)?;
            return Ok(Self::Maintenance(secret));
        }

        if dev_auth_bypass {
            return Ok(Self::DevBypass);
        }

        Ok(Self::Normal)
    }

    /// Verify an already built mode is allowed under `environment`.
    ///
    /// # Errors
    /// Returns an error when the dev bypass is paired with production.
    pub fn check(&self, environment: Environment) -> Result<(), ConfigError> {
        if self.is_dev_bypass() && environment == Environment::Production {
            return Err(ConfigError::DevBypassInProduction);
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Maintenance(_) => "maintenance",
            Self::DevBypass => "dev-bypass",
        }
    }

    #[must_use]
    pub fn is_dev_bypass(&self) -> bool {
        matches!(self, Self::DevBypass)
    }
}

impl fmt::Debug for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maintenance(_) => f.write_str("Maintenance(***)"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::from(value.to_string()))
    }

    #[test]
    fn dev_bypass_refuses_production() {
        let result = RuntimeMode::resolve(Environment::Production, false, None, true);
        assert!(matches!(result, Err(ConfigError::DevBypassInProduction)));

        assert!(RuntimeMode::DevBypass.check(Environment::Production).is_err());
        assert!(RuntimeMode::DevBypass.check(Environment::Development).is_ok());
        assert!(RuntimeMode::Normal.check(Environment::Production).is_ok());
    }

    #[test]
    fn dev_bypass_allowed_in_development() {
        let mode = RuntimeMode::resolve(Environment::Development, false, None, true);
        assert!(matches!(mode, Ok(RuntimeMode::DevBypass)));
    }

    #[test]
    fn maintenance_requires_secret() {
        let missing = RuntimeMode::resolve(Environment::Production, true, None, false);
        assert!(matches!(missing, Err(ConfigError::MaintenanceSecretMissing)));

        let blank = RuntimeMode::resolve(Environment::Production, true, secret("  "), false);
        assert!(matches!(blank, Err(ConfigError::MaintenanceSecretMissing)));

        let mode = RuntimeMode::resolve(Environment::Production, true, secret("s3cret"), false);
        assert!(matches!(mode, Ok(RuntimeMode::Maintenance(_))));
    }

    #[test]
    fn maintenance_and_bypass_conflict() {
        let result = RuntimeMode::resolve(Environment::Development, true, secret("x"), true);
        assert!(matches!(result, Err(ConfigError::ConflictingModes)));
    }

    #[test]
    fn normal_by_default() {
        let mode = RuntimeMode::resolve(Environment::Production, false, secret("unused"), false);
        assert!(matches!(mode, Ok(RuntimeMode::Normal)));
    }

    #[test]
    fn debug_hides_maintenance_secret() {
        let mode = RuntimeMode::Maintenance(SecretString::from("hunter2".to_string()));
        assert_eq!(format!("{mode:?}"), "Maintenance(***)");
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>().ok(), Some(Environment::Production));
        assert_eq!(
            " Development ".parse::<Environment>().ok(),
            Some(Environment::Development)
        );
        assert!("staging".parse::<Environment>().is_err());
        assert!(Environment::Production.secure_cookies());
        assert!(!Environment::Development.secure_cookies());
    }
}
