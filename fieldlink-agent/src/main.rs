//! Field telemetry agent.
//!
//! Collects sensor and device status batches and delivers them to an HTTP
//! collector, queueing anything undelivered on disk.

use anyhow::Result;
use fieldlink_agent_framework::{AgentArgs, AgentConfig, AgentRunner};

use fieldlink_agent::{Agent, FieldlinkConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = AgentArgs::parse_with_default("fieldlink.json5");

    // Load configuration using the framework's AgentConfig trait
    let config = FieldlinkConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Create the runner (initializes logging)
    let mut runner = AgentRunner::new_with_args("fieldlink-agent", config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let agent = Agent::new(runner.config().clone(), runner.shutdown())
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(
        "Agent running (collector: {}, device: {}, interval: {}s)",
        agent.config().collector.base_url(),
        agent.identity().device_id(),
        agent.config().collection.interval_secs
    );

    runner.spawn("pipeline", agent.run());

    // Run until Ctrl+C or SIGTERM
    runner.run().await.map_err(|e| anyhow::anyhow!("{}", e))
}
