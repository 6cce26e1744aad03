//! Transport negotiation: the credential fetch and the offer/answer tail.
//!
//! Each step is a distinct failure point with fail-fast propagation; the
//! lifecycle controller releases whatever was acquired when a step fails.
//! Completion of `establish` does not by itself make the session ACTIVE.
//! Only the control channel's `Opened` signal does, and it may race with the
//! answer being applied.

use crate::{
    error::BridgeError,
    signaling::{EphemeralCredential, OfferExchange, TokenIssuer},
    transport::{ChannelEvent, MediaTransport},
};
use tokio::sync::mpsc;
use tracing::debug;

/// Step 1: request the ephemeral credential.
pub(crate) async fn fetch_credential(
    issuer: &dyn TokenIssuer,
) -> Result<EphemeralCredential, BridgeError> {
    issuer.issue().await.map_err(BridgeError::CredentialUnavailable)
}

/// Steps 3-6: capture attachment, control channel, offer, answer.
///
/// The transport itself (step 2) is created by the caller so it can be
/// registered for cancellation before any further step runs.
pub(crate) async fn establish(
    transport: &dyn MediaTransport,
    exchange: &dyn OfferExchange,
    credential: &EphemeralCredential,
) -> Result<mpsc::Receiver<ChannelEvent>, BridgeError> {
    transport.attach_capture().await?;

    // Opened before the offer exists, so the remote end can talk to us the
    // moment the channel is acknowledged.
    let events = transport.open_control_channel().await?;

    let offer = transport.create_offer().await?;
    debug!(offer_len = offer.len(), "local description applied, exchanging offer");

    let answer = exchange
        .exchange(credential, &offer)
        .await
        .map_err(|err| BridgeError::NegotiationRejected(err.to_string()))?;
    debug!(answer_len = answer.len(), "remote answer received");

    transport.apply_answer(&answer).await?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{MockOfferExchange, MockTokenIssuer, SignalingError};
    use crate::transport::testing::ScriptedTransport;

    #[tokio::test]
    async fn credential_failure_maps_to_credential_unavailable() {
        let mut issuer = MockTokenIssuer::new();
        issuer
            .expect_issue()
            .returning(|| Err(SignalingError::Issuer("503 from issuer".into())));

        let err = fetch_credential(&issuer).await.unwrap_err();
        assert!(matches!(err, BridgeError::CredentialUnavailable(_)));
    }

    #[tokio::test]
    async fn capture_denial_maps_to_media_capture_denied() {
        let transport =
            ScriptedTransport::with_capture_denial(Some("permission refused".to_string()));
        let exchange = MockOfferExchange::new();

        let err = establish(&*transport, &exchange, &EphemeralCredential::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MediaCaptureDenied(_)));
    }

    #[tokio::test]
    async fn rejected_offer_maps_to_negotiation_rejected() {
        let transport = ScriptedTransport::new();
        let mut exchange = MockOfferExchange::new();
        exchange
            .expect_exchange()
            .returning(|_, _| Err(SignalingError::Rejected("401 Unauthorized".into())));

        let err = establish(&*transport, &exchange, &EphemeralCredential::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NegotiationRejected(_)));
    }

    #[tokio::test]
    async fn successful_negotiation_yields_the_event_stream() {
        let transport = ScriptedTransport::new();
        let mut exchange = MockOfferExchange::new();
        exchange
            .expect_exchange()
            .returning(|_, _| Ok("v=0\r\ns=answer\r\n".to_string()));

        let mut events = establish(&*transport, &exchange, &EphemeralCredential::new("tok"))
            .await
            .unwrap();

        transport.events_tx.send(ChannelEvent::Opened).await.unwrap();
        assert_eq!(events.recv().await, Some(ChannelEvent::Opened));
    }
}
