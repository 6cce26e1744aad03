//! Signaling interfaces: credential issuance and the offer/answer exchange.
//!
//! Both collaborators are black boxes specified only by what the negotiator
//! consumes; `civetta-voice` provides the HTTP implementations.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// A short-lived bearer credential authorizing exactly one realtime session.
#[derive(Debug, Clone)]
pub struct EphemeralCredential {
    pub secret: String,
}

impl EphemeralCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("token issuer: {0}")]
    Issuer(String),
    #[error("remote endpoint rejected the offer: {0}")]
    Rejected(String),
}

/// Issues the ephemeral credential that authorizes a realtime media session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<EphemeralCredential, SignalingError>;
}

/// Performs the single synchronous offer/answer round trip with the remote
/// speech model endpoint.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OfferExchange: Send + Sync {
    /// Sends the raw local session description, authenticated with the
    /// credential, and returns the raw remote answer.
    async fn exchange(
        &self,
        credential: &EphemeralCredential,
        offer_sdp: &str,
    ) -> Result<String, SignalingError>;
}
