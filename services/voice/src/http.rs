//! HTTP implementations of the core signaling and reasoning seams.

use async_trait::async_trait;
use civetta_core::reasoning::{ReasoningClient, ReasoningError};
use civetta_core::signaling::{EphemeralCredential, OfferExchange, SignalingError, TokenIssuer};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Builds the signaling URL the SDP offer is posted to.
fn realtime_endpoint(base: &str, model: &str) -> String {
    format!("{base}?model={model}")
}

#[derive(Deserialize)]
struct TokenResponse {
    client_secret: String,
}

/// Fetches ephemeral realtime credentials from the backend token endpoint.
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenIssuer {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self) -> Result<EphemeralCredential, SignalingError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SignalingError::Issuer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SignalingError::Issuer(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SignalingError::Issuer(e.to_string()))?;
        debug!("obtained ephemeral realtime credential");
        Ok(EphemeralCredential::new(token.client_secret))
    }
}

/// Posts the raw SDP offer to the realtime endpoint and returns the answer.
pub struct HttpOfferExchange {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOfferExchange {
    pub fn new(client: reqwest::Client, realtime_url: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: realtime_endpoint(realtime_url, model),
        }
    }
}

#[async_trait]
impl OfferExchange for HttpOfferExchange {
    async fn exchange(
        &self,
        credential: &EphemeralCredential,
        offer_sdp: &str,
    ) -> Result<String, SignalingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&credential.secret)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| SignalingError::Rejected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SignalingError::Rejected(format!(
                "realtime endpoint returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| SignalingError::Rejected(e.to_string()))
    }
}

#[derive(Serialize)]
struct ReasoningRequest<'a> {
    message: &'a str,
    session_id: &'a str,
}

#[derive(Deserialize)]
struct ReasoningResponse {
    reply: String,
}

/// Forwards intercepted knowledge-base queries to the reasoning backend.
pub struct HttpReasoningClient {
    client: reqwest::Client,
    url: String,
}

impl HttpReasoningClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn ask(&self, message: &str, session_id: &str) -> Result<String, ReasoningError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ReasoningRequest {
                message,
                session_id,
            })
            .send()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ReasoningError::Unavailable(format!(
                "reasoning endpoint returned {}",
                response.status()
            )));
        }
        let body: ReasoningResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;
        Ok(body.reply)
    }
}
