use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use crate::{config::ConfigError, gateway::RouteConfig};

pub const ARG_PROTECTED_ROUTES: &str = "protected-routes";
pub const ARG_AUTH_ROUTES: &str = "auth-routes";
pub const ARG_ADMIN_PREFIX: &str = "admin-prefix";
pub const ARG_ADMIN_LOGIN_PATH: &str = "admin-login-path";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_LANDING_PATH: &str = "landing-path";

#[derive(Debug)]
pub struct Options {
    pub routes: RouteConfig,
}

impl Options {
    /// Collect the route classes used by the edge guard.
    ///
    /// # Errors
    /// Returns an error if any configured route is not an absolute path.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let defaults = RouteConfig::default();

        let routes = RouteConfig {
            protected: list(matches, ARG_PROTECTED_ROUTES).unwrap_or(defaults.protected),
            auth_only: list(matches, ARG_AUTH_ROUTES).unwrap_or(defaults.auth_only),
            admin_prefix: single(matches, ARG_ADMIN_PREFIX).unwrap_or(defaults.admin_prefix),
            admin_login_path: single(matches, ARG_ADMIN_LOGIN_PATH)
                .unwrap_or(defaults.admin_login_path),
            login_path: single(matches, ARG_LOGIN_PATH).unwrap_or(defaults.login_path),
            landing_path: single(matches, ARG_LANDING_PATH).unwrap_or(defaults.landing_path),
        };

        let all = routes.protected.iter().chain(&routes.auth_only).chain([
            &routes.admin_prefix,
            &routes.admin_login_path,
            &routes.login_path,
            &routes.landing_path,
        ]);
        for route in all {
            if !route.starts_with('/') {
                return Err(ConfigError::InvalidRoute(route.clone()).into());
            }
        }

        Ok(Self { routes })
    }
}

fn list(matches: &ArgMatches, id: &str) -> Option<Vec<String>> {
    matches.get_many::<String>(id).map(|values| {
        values
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    })
}

fn single(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .map(|value| value.trim().to_string())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROTECTED_ROUTES)
                .long(ARG_PROTECTED_ROUTES)
                .help("Comma separated path prefixes that require an access cookie")
                .env("SESSIONGATE_PROTECTED_ROUTES")
                .value_delimiter(',')
                .default_values(["/dashboard", "/translate", "/batches", "/api-keys", "/settings"]),
        )
        .arg(
            Arg::new(ARG_AUTH_ROUTES)
                .long(ARG_AUTH_ROUTES)
                .help("Comma separated path prefixes only shown to signed out visitors")
                .env("SESSIONGATE_AUTH_ROUTES")
                .value_delimiter(',')
                .default_values(["/login", "/signup", "/forgot-password"]),
        )
        .arg(
            Arg::new(ARG_ADMIN_PREFIX)
                .long(ARG_ADMIN_PREFIX)
                .help("Path prefix of the admin area")
                .env("SESSIONGATE_ADMIN_PREFIX")
                .default_value("/admin"),
        )
        .arg(
            Arg::new(ARG_ADMIN_LOGIN_PATH)
                .long(ARG_ADMIN_LOGIN_PATH)
                .help("Admin login page")
                .env("SESSIONGATE_ADMIN_LOGIN_PATH")
                .default_value("/admin/login"),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Login page unauthenticated visitors are redirected to")
                .env("SESSIONGATE_LOGIN_PATH")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_LANDING_PATH)
                .long(ARG_LANDING_PATH)
                .help("Default destination after sign in")
                .env("SESSIONGATE_LANDING_PATH")
                .default_value("/dashboard"),
        )
}
