//! Device identity and auth-token bootstrap.
//!
//! The [`Bootstrapper`] is the only writer of the shared [`Identity`]; the
//! exporter and the retry worker read the token before every request, so a
//! refresh is picked up without restarting anything.

use std::sync::Arc;
use std::time::Duration;

use fieldlink_agent_framework::Shutdown;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Header carrying the device token on every collector request.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Registration endpoint path.
pub const REGISTRATION_ENDPOINT: &str = "/devices";

/// Who this device is, and the token it currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub description: String,
    pub token: String,
}

/// Shared, process-wide identity state.
///
/// Readers always get a complete token: the whole string is swapped under a
/// write lock and readers clone it under a read lock.
#[derive(Debug, Clone)]
pub struct Identity {
    inner: Arc<RwLock<DeviceIdentity>>,
}

impl Identity {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(identity)),
        }
    }

    /// Snapshot of the full identity.
    pub fn snapshot(&self) -> DeviceIdentity {
        self.inner.read().clone()
    }

    /// Current token; empty before the first successful registration.
    pub fn token(&self) -> String {
        self.inner.read().token.clone()
    }

    pub fn device_id(&self) -> String {
        self.inner.read().device_id.clone()
    }

    fn set_token(&self, token: String) {
        self.inner.write().token = token;
    }
}

/// Timing for registration attempts.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationPolicy {
    /// Wait between failed attempts.
    pub backoff: Duration,
    /// Timeout for a single registration request.
    pub request_timeout: Duration,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Why a registration attempt did not yield a token.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Registration request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Registration rejected with status {0}")]
    Rejected(StatusCode),

    #[error("Registration returned status {0} without a token")]
    MissingToken(StatusCode),

    #[error("Registration response could not be decoded: {0}")]
    InvalidBody(#[source] reqwest::Error),

    #[error("Registration interrupted by shutdown")]
    Shutdown,
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    id: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Acquires and refreshes the device token.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    client: Client,
    base_url: String,
    identity: Identity,
    policy: RegistrationPolicy,
    shutdown: Shutdown,
}

impl Bootstrapper {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        identity: Identity,
        policy: RegistrationPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            identity,
            policy,
            shutdown,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Register the device and store the returned token.
    ///
    /// Retries until the collector answers 200/201 with a non-empty token.
    /// Only shutdown ends the loop early, with [`RegistrationError::Shutdown`].
    pub async fn register(&self) -> Result<String, RegistrationError> {
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_requested() {
                info!("Registration stopped due to shutdown signal");
                return Err(RegistrationError::Shutdown);
            }

            attempt += 1;
            match self.try_register().await {
                Ok(token) => {
                    self.identity.set_token(token.clone());
                    info!(
                        device_id = %self.identity.device_id(),
                        attempt,
                        "Device registered successfully with token"
                    );
                    return Ok(token);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        "Could not register device. Trying again in {}s",
                        self.policy.backoff.as_secs()
                    );
                }
            }

            if !self.shutdown.sleep(self.policy.backoff).await {
                info!("Registration stopped due to shutdown signal");
                return Err(RegistrationError::Shutdown);
            }
        }
    }

    /// One registration request.
    async fn try_register(&self) -> Result<String, RegistrationError> {
        let identity = self.identity.snapshot();
        let url = format!("{}{}", self.base_url, REGISTRATION_ENDPOINT);

        let mut request = self
            .client
            .post(url)
            .timeout(self.policy.request_timeout)
            .json(&RegistrationRequest {
                id: &identity.device_id,
                description: &identity.description,
            });
        if !identity.token.is_empty() {
            request = request.header(API_KEY_HEADER, identity.token.as_str());
        }

        let response = request.send().await.map_err(RegistrationError::Transport)?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(RegistrationError::Rejected(status));
        }

        let body: RegistrationResponse = response
            .json()
            .await
            .map_err(RegistrationError::InvalidBody)?;

        match body.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(RegistrationError::MissingToken(status)),
        }
    }
}
