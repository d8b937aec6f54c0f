use crate::{cli::telemetry, gateway};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub gateway: gateway::GatewayConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the gateway cannot be built or the port cannot be bound.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        "Backend: {} (refresh path: {}, retries: {})",
        args.gateway.backend.base_url(),
        args.gateway.backend.refresh_path(),
        args.gateway.backend.retry_attempts()
    );

    let result = gateway::new(args.port, args.gateway).await;

    telemetry::shutdown_tracer();

    result
}
