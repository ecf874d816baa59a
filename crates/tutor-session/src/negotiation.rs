//! SDP offer/answer exchange with the realtime endpoint.
//!
//! The local offer is posted as plain SDP text, authenticated with the
//! ephemeral credential as a bearer token; the target model rides in
//! the query string. A 2xx response body is the remote answer SDP; any
//! other status folds the response text into the error.

use crate::config::Config;
use crate::credential::Credential;
use async_trait::async_trait;
use common::secret::ExposeSecret;
use thiserror::Error;
use tracing::debug;

/// Errors from the negotiation endpoint.
#[derive(Debug, Clone, Error)]
pub enum NegotiationError {
    /// The request never produced a response.
    #[error("negotiation transport error: {0}")]
    Http(String),

    /// The endpoint rejected the offer.
    #[error("negotiation endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },
}

/// Performs the offer/answer exchange.
///
/// A seam so lifecycle tests can hand back a canned answer without a
/// network round trip.
#[async_trait]
pub trait SdpExchanger: Send + Sync {
    /// Exchange a local offer for the remote answer SDP.
    async fn exchange(
        &self,
        credential: &Credential,
        offer_sdp: &str,
    ) -> Result<String, NegotiationError>;
}

/// HTTP exchanger backed by the realtime endpoint.
pub struct HttpSdpExchanger {
    client: reqwest::Client,
    realtime_url: String,
    model: String,
}

impl HttpSdpExchanger {
    /// Build an exchanger from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::Http`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &Config) -> Result<Self, NegotiationError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| NegotiationError::Http(e.to_string()))?;

        Ok(Self {
            client,
            realtime_url: config.realtime_url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl SdpExchanger for HttpSdpExchanger {
    async fn exchange(
        &self,
        credential: &Credential,
        offer_sdp: &str,
    ) -> Result<String, NegotiationError> {
        debug!(
            target: "tutor.negotiation",
            endpoint = %self.realtime_url,
            model = %self.model,
            offer_bytes = offer_sdp.len(),
            "Posting SDP offer"
        );

        let response = self
            .client
            .post(&self.realtime_url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(credential.secret.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| NegotiationError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NegotiationError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(NegotiationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            target: "tutor.negotiation",
            answer_bytes = body.len(),
            "Received SDP answer"
        );

        Ok(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use common::secret::SecretString;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_credential() -> Credential {
        Credential {
            secret: SecretString::from("ek_test"),
            expires_at: None,
        }
    }

    fn exchanger(server: &MockServer) -> HttpSdpExchanger {
        let mut config = Config::new("http://unused.test/token");
        config.realtime_url = format!("{}/v1/realtime", server.uri());
        config.model = "gpt-4o-realtime-preview-2024-12-17".to_string();
        HttpSdpExchanger::new(&config).unwrap()
    }

    #[tokio::test]
    async fn posts_offer_with_bearer_and_model_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .and(query_param("model", "gpt-4o-realtime-preview-2024-12-17"))
            .and(header("authorization", "Bearer ek_test"))
            .and(header("content-type", "application/sdp"))
            .and(body_string_contains("v=0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v=0\r\nanswer-sdp"))
            .expect(1)
            .mount(&server)
            .await;

        let answer = exchanger(&server)
            .exchange(&test_credential(), "v=0\r\noffer-sdp")
            .await
            .unwrap();

        assert!(answer.contains("answer-sdp"));
    }

    #[tokio::test]
    async fn non_2xx_folds_body_into_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid ephemeral key"))
            .mount(&server)
            .await;

        let result = exchanger(&server)
            .exchange(&test_credential(), "v=0\r\noffer-sdp")
            .await;

        match result {
            Err(NegotiationError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid ephemeral key"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
