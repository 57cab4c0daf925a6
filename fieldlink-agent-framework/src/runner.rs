//! Agent runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinSet;

use fieldlink_common::{LoggingConfig, init_tracing};

use crate::AgentArgs;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::shutdown::{self, Shutdown, ShutdownTrigger};

/// Default time granted to tasks to wind down after shutdown is requested.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Agent runner that manages the lifecycle of a long-running agent.
///
/// Handles:
/// - Logging initialization
/// - Task spawning and supervision
/// - SIGINT/SIGTERM handling
/// - Cooperative shutdown with a bounded grace period
///
/// # Example
///
/// ```ignore
/// use fieldlink_agent_framework::{AgentArgs, AgentConfig, AgentRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = AgentArgs::parse_with_default("myagent.json5");
///     let config = MyAgentConfig::load(&args.config)?;
///
///     let mut runner = AgentRunner::new_with_args("myagent", config, Some(&args))?;
///
///     let shutdown = runner.shutdown();
///     runner.spawn("worker", async move {
///         while shutdown.sleep(std::time::Duration::from_secs(5)).await {
///             // Worker logic here
///         }
///     });
///
///     runner.run().await
/// }
/// ```
pub struct AgentRunner<C: AgentConfig> {
    /// Agent name for logging.
    name: String,
    /// Agent version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Fires the shutdown token.
    trigger: ShutdownTrigger,
    /// Token handed to every worker.
    shutdown: Shutdown,
    /// Spawned tasks.
    tasks: JoinSet<()>,
    /// How long to wait for tasks after shutdown is requested.
    grace_period: Duration,
}

impl<C: AgentConfig> AgentRunner<C> {
    /// Create a new agent runner and initialize logging from config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new agent runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&AgentArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| AgentError::config(e.to_string()))?;

        tracing::info!(agent = %name, version = %version, "Starting agent");

        Ok(Self::without_tracing(name, version, config))
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn without_tracing(
        name: impl Into<String>,
        version: impl Into<String>,
        config: C,
    ) -> Self {
        let (trigger, shutdown) = shutdown::channel();
        Self {
            name: name.into(),
            version: version.into(),
            config,
            trigger,
            shutdown,
            tasks: JoinSet::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override the shutdown grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get the agent name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the agent version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a shutdown token observing this runner.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Spawn a worker task.
    ///
    /// The task is expected to observe the shutdown token and return on its own.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        self.tasks.spawn(async move {
            future.await;
            tracing::debug!(worker = %name, "Worker finished");
        });
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        self.tasks.spawn(async move {
            match future.await {
                Ok(()) => tracing::debug!(worker = %name, "Worker finished"),
                Err(e) => tracing::error!(worker = %name, error = %e, "Worker failed"),
            }
        });
    }

    /// Run the agent until a shutdown signal is received.
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Run the agent until `stop` resolves or a worker exits.
    ///
    /// This will:
    /// 1. Wait for `stop` (or for any worker to exit on its own)
    /// 2. Fire the shutdown token
    /// 3. Wait up to the grace period for workers to return
    /// 4. Abort whatever is still running
    pub async fn run_until<S>(mut self, stop: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tracing::info!(
            agent = %self.name,
            tasks = self.tasks.len(),
            "Agent running. Press Ctrl+C to stop."
        );

        tokio::select! {
            _ = stop => {
                tracing::info!(agent = %self.name, "Received shutdown signal");
            }
            Some(res) = self.tasks.join_next() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Worker panicked");
                }
                tracing::warn!(agent = %self.name, "Worker exited; shutting down");
            }
        }

        self.trigger.trigger();

        let drained = tokio::time::timeout(self.grace_period, async {
            while let Some(res) = self.tasks.join_next().await {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Worker panicked during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                agent = %self.name,
                remaining = self.tasks.len(),
                "Grace period elapsed; aborting remaining workers"
            );
            self.tasks.abort_all();
        }

        tracing::info!(agent = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on unix, SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = signal::ctrl_c() => {
                        if let Err(e) = res {
                            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                        }
                    }
                    _ = term.recv() => {
                        tracing::debug!("SIGTERM received");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
