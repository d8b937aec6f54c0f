use anyhow::Result;
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::config::{Environment, RuntimeMode};

pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_MAINTENANCE: &str = "maintenance";
pub const ARG_MAINTENANCE_SECRET: &str = "maintenance-secret";
pub const ARG_DEV_AUTH_BYPASS: &str = "dev-auth-bypass";

#[derive(Debug)]
pub struct Options {
    pub environment: Environment,
    pub mode: RuntimeMode,
}

impl Options {
    /// Resolve the environment and runtime mode flags.
    ///
    /// # Errors
    /// Returns an error for an unknown environment, a maintenance mode without
    /// secret, or a dev auth bypass in production.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let environment = matches
            .get_one::<String>(ARG_ENVIRONMENT)
            .map_or("production", String::as_str)
            .parse::<Environment>()?;

        let mode = RuntimeMode::resolve(
            environment,
            matches.get_flag(ARG_MAINTENANCE),
            matches
                .get_one::<String>(ARG_MAINTENANCE_SECRET)
                .map(|secret| SecretString::from(secret.clone())),
            matches.get_flag(ARG_DEV_AUTH_BYPASS),
        )?;

        Ok(Self { environment, mode })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: development or production")
                .env("SESSIONGATE_ENVIRONMENT")
                .default_value("production"),
        )
        .arg(
            Arg::new(ARG_MAINTENANCE)
                .long(ARG_MAINTENANCE)
                .help("Serve a maintenance page for every page route")
                .env("SESSIONGATE_MAINTENANCE_MODE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_MAINTENANCE_SECRET)
                .long(ARG_MAINTENANCE_SECRET)
                .help("Secret accepted as ?bypass=<secret> during maintenance")
                .env("SESSIONGATE_MAINTENANCE_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DEV_AUTH_BYPASS)
                .long(ARG_DEV_AUTH_BYPASS)
                .help("Disable the route guard and fake a session (development only)")
                .env("SESSIONGATE_DEV_AUTH_BYPASS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
