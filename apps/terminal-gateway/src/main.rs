use anyhow::Result;
use ptb_gateway::config::GatewayConfig;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    ptb_telemetry::install("terminal-gateway")?;

    let config = GatewayConfig::from_env()?;
    let result = ptb_gateway::run(config).await;
    if let Err(err) = ptb_telemetry::shutdown() {
        warn!(error = %err, "telemetry shutdown failed");
    }
    result
}
