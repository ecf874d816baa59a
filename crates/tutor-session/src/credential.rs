//! Ephemeral credential acquisition.
//!
//! The trusted backend issues short-lived keys (about five minutes)
//! that authorize exactly one realtime voice session. The provider
//! fetches one with a `GET`, validates that the nested secret value is
//! present, and distinguishes a malformed response from a transport
//! failure. The initial fetch for a session is retried (3 attempts,
//! 1 s base delay, exponential backoff); mid-session refreshes use a
//! single attempt because a refresh failure must end the session, not
//! retry forever.
//!
//! Counters: every invocation increments the request counter, every
//! failure the failure counter. They reset only at process start.

use crate::config::Config;
use crate::metrics::CredentialMetrics;
use async_trait::async_trait;
use common::retry::{retry, RetryConfig};
use common::secret::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A short-lived bearer credential for one realtime session.
///
/// Owned exclusively by the session for its duration; never persisted;
/// dropped on teardown or refresh. The secret is redacted in `Debug`.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The ephemeral key, sent as a bearer token during negotiation.
    pub secret: SecretString,

    /// Server-reported expiry (Unix timestamp), when provided.
    pub expires_at: Option<i64>,
}

impl Credential {
    /// Seconds until the server-reported expiry, when known.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|exp| exp - chrono::Utc::now().timestamp())
    }
}

/// Errors from the credential endpoint.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The request never produced a usable response.
    #[error("credential transport error: {0}")]
    Http(String),

    /// The endpoint answered with a non-2xx status.
    #[error("credential endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (error JSON from the backend).
        body: String,
    },

    /// The response parsed but carried no usable secret value.
    #[error("malformed credential response: {0}")]
    Malformed(String),
}

/// Source of session credentials.
///
/// The session state machine depends on this seam rather than on the
/// HTTP client directly, so lifecycle tests can script credential
/// behavior without a network.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch the credential for a new connection, retrying transient
    /// failures per the configured policy.
    async fn fetch_initial(&self) -> Result<Credential, CredentialError>;

    /// Single-attempt refresh used by the mid-session refresh timer.
    async fn refresh(&self) -> Result<Credential, CredentialError>;
}

/// Credential endpoint response: `{ "client_secret": { "value": ... } }`.
#[derive(Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// HTTP credential provider backed by the trusted backend endpoint.
pub struct CredentialProvider {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
    metrics: Arc<CredentialMetrics>,
}

impl CredentialProvider {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Http`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &Config, metrics: Arc<CredentialMetrics>) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.credential_url.clone(),
            retry: config.retry.clone(),
            metrics,
        })
    }

    /// The counters this provider increments.
    #[must_use]
    pub fn metrics(&self) -> Arc<CredentialMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Perform one `GET` against the credential endpoint.
    async fn fetch_once(&self) -> Result<Credential, CredentialError> {
        self.metrics.record_request();

        let result = self.request().await;
        if result.is_err() {
            self.metrics.record_failure();
        }
        result
    }

    async fn request(&self) -> Result<Credential, CredentialError> {
        debug!(
            target: "tutor.credential",
            endpoint = %self.endpoint,
            "Requesting ephemeral credential"
        );

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "tutor.credential",
                status = status.as_u16(),
                "Credential endpoint returned an error status"
            );
            return Err(CredentialError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CredentialResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;

        let Some(secret) = parsed.client_secret else {
            return Err(CredentialError::Malformed(
                "response has no client_secret field".to_string(),
            ));
        };
        if secret.value.is_empty() {
            return Err(CredentialError::Malformed(
                "client_secret.value is empty".to_string(),
            ));
        }

        debug!(
            target: "tutor.credential",
            expires_at = ?secret.expires_at,
            "Credential acquired"
        );

        Ok(Credential {
            secret: SecretString::from(secret.value),
            expires_at: secret.expires_at,
        })
    }
}

#[async_trait]
impl CredentialSource for CredentialProvider {
    async fn fetch_initial(&self) -> Result<Credential, CredentialError> {
        retry(|| self.fetch_once(), &self.retry).await
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        self.fetch_once().await
    }
}
