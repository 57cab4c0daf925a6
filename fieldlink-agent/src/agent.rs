//! Wiring of the delivery pipeline.
//!
//! [`Agent`] builds every component once from the configuration and hands
//! them to each other explicitly. Nothing in the pipeline is global: tests
//! construct their own `Agent` against a temp queue and a mock collector.

use fieldlink_agent_framework::{AgentError, Result, Shutdown};
use reqwest::Client;
use tracing::{error, info};

use crate::config::FieldlinkConfig;
use crate::device_status::{StatusProbe, SystemProbe};
use crate::exporter::Exporter;
use crate::identity::{Bootstrapper, Identity, RegistrationError};
use crate::orchestrator::Orchestrator;
use crate::queue::QueueStore;
use crate::retry::RetryWorker;
use crate::sources::build_sources;

/// The assembled agent.
pub struct Agent {
    config: FieldlinkConfig,
    bootstrapper: Bootstrapper,
    exporter: Exporter,
    store: QueueStore,
    shutdown: Shutdown,
}

impl Agent {
    /// Build the agent, opening the queue file named in the configuration.
    pub fn new(config: FieldlinkConfig, shutdown: Shutdown) -> Result<Self> {
        let store = QueueStore::open(&config.queue.path).map_err(|e| {
            AgentError::with_context(
                format!("Failed to open queue {}", config.queue.path.display()),
                e,
            )
        })?;
        Self::with_store(config, store, shutdown)
    }

    /// Build the agent around an already open queue.
    pub fn with_store(
        config: FieldlinkConfig,
        store: QueueStore,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fieldlink-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::with_context("Failed to build HTTP client", e))?;

        let base_url = config.collector.base_url();
        let identity = Identity::new(config.identity());
        let bootstrapper = Bootstrapper::new(
            client.clone(),
            base_url.clone(),
            identity,
            config.registration_policy(),
            shutdown.clone(),
        );
        let exporter = Exporter::new(
            client,
            base_url,
            bootstrapper.clone(),
            config.collector.request_timeout(),
        );

        Ok(Self {
            config,
            bootstrapper,
            exporter,
            store,
            shutdown,
        })
    }

    pub fn config(&self) -> &FieldlinkConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        self.bootstrapper.identity()
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrapper
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// A retry worker over this agent's queue and exporter.
    pub fn retry_worker(&self) -> RetryWorker {
        RetryWorker::new(
            self.exporter.clone(),
            self.store.clone(),
            self.config.retry.policy(),
            self.shutdown.clone(),
        )
    }

    /// A collection loop over the configured sources and the host probe.
    pub fn orchestrator(&self) -> Orchestrator {
        let probe: Option<Box<dyn StatusProbe>> = if self.config.collection.device_status {
            Some(Box::new(SystemProbe::new()))
        } else {
            None
        };
        self.orchestrator_with_probe(probe)
    }

    /// A collection loop with a caller-supplied status probe.
    pub fn orchestrator_with_probe(&self, probe: Option<Box<dyn StatusProbe>>) -> Orchestrator {
        Orchestrator::new(
            build_sources(&self.config.sources),
            probe,
            self.exporter.clone(),
            self.store.clone(),
            self.config.collection.interval(),
            self.shutdown.clone(),
        )
    }

    /// Register, then run the retry worker and the collection loop until
    /// shutdown.
    pub async fn run(self) {
        info!(
            device_id = %self.identity().device_id(),
            collector = %self.config.collector.base_url(),
            queue = %self.store.path().display(),
            "Starting delivery pipeline"
        );

        match self.bootstrapper.register().await {
            Ok(_) => {}
            Err(RegistrationError::Shutdown) => {
                info!("Shutdown requested before registration completed");
                return;
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                return;
            }
        }

        match self.store.blocking(|store| store.len()).await {
            Ok(pending) if pending > 0 => info!(pending, "Resuming with queued batches"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Could not inspect queue"),
        }

        let retry = self.retry_worker().spawn();
        self.orchestrator().run().await;
        retry.join().await;

        info!("Delivery pipeline stopped");
    }
}
