//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{backend, mode, routes, ARG_PORT};
use crate::gateway::GatewayConfig;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let backend_opts = backend::Options::parse(matches).context("invalid backend settings")?;
    let mode_opts = mode::Options::parse(matches).context("invalid runtime mode")?;
    let routes_opts = routes::Options::parse(matches).context("invalid route settings")?;

    Ok(Action::Server(Args {
        port,
        gateway: GatewayConfig {
            backend: backend_opts.config,
            routes: routes_opts.routes,
            environment: mode_opts.environment,
            mode: mode_opts.mode,
        },
    }))
}
