//! Live delivery of batches to the collector.

use std::time::Duration;

use fieldlink_agent_framework::Batch;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::identity::{API_KEY_HEADER, Bootstrapper, Identity};

/// Status reported when the request never got an HTTP response.
pub const NETWORK_FAILURE_STATUS: u16 = 500;

/// The status that confirms delivery.
pub const DELIVERED_STATUS: u16 = 201;

/// Sends batches to the collector.
///
/// Never persists anything: the caller decides what to do with a failed
/// status. The only side effect besides the request is a token refresh on 401.
#[derive(Debug, Clone)]
pub struct Exporter {
    client: Client,
    base_url: String,
    identity: Identity,
    bootstrapper: Bootstrapper,
    request_timeout: Duration,
}

impl Exporter {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        bootstrapper: Bootstrapper,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            identity: bootstrapper.identity().clone(),
            bootstrapper,
            request_timeout,
        }
    }

    /// Send `batch` to the endpoint for its kind and return the final status.
    ///
    /// A 401 triggers one re-registration and exactly one resend. Transport
    /// failures come back as [`NETWORK_FAILURE_STATUS`].
    pub async fn send(&self, batch: &Batch) -> u16 {
        let status = self.attempt(batch).await;
        if status != StatusCode::UNAUTHORIZED.as_u16() {
            return status;
        }

        info!(kind = %batch.kind(), "Token rejected, re-registering device");
        if let Err(e) = self.bootstrapper.register().await {
            warn!(kind = %batch.kind(), error = %e, "Token refresh failed");
            return status;
        }

        self.attempt(batch).await
    }

    async fn attempt(&self, batch: &Batch) -> u16 {
        let kind = batch.kind();
        let url = format!("{}{}", self.base_url, kind.endpoint());
        let token = self.identity.token();

        let result = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .header(API_KEY_HEADER, token.as_str())
            .json(batch)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(kind = %kind, url = %url, error = %e, "Export request failed");
                return NETWORK_FAILURE_STATUS;
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(kind = %kind, status = status.as_u16(), count = batch.len(), "Batch exported");
            return status.as_u16();
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            kind = %kind,
            status = status.as_u16(),
            message = %server_error_message(&body),
            "Collector rejected batch"
        );
        status.as_u16()
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Looks for `error`, `message` or `detail` in a JSON object and falls back
/// to the raw text.
fn server_error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        for field in ["error", "message", "detail"] {
            match map.get(field) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty body>".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json_fields() {
        assert_eq!(
            server_error_message(r#"{"error":"invalid payload"}"#),
            "invalid payload"
        );
        assert_eq!(
            server_error_message(r#"{"message":"token expired","code":401}"#),
            "token expired"
        );
        assert_eq!(
            server_error_message(r#"{"detail":[{"loc":["body"],"msg":"bad"}]}"#),
            r#"[{"loc":["body"],"msg":"bad"}]"#
        );
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            server_error_message(r#"{"message":"second","error":"first"}"#),
            "first"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_text() {
        assert_eq!(server_error_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(server_error_message(r#"{"status":"down"}"#), r#"{"status":"down"}"#);
        assert_eq!(server_error_message("  "), "<empty body>");
    }
}
