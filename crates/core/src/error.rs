//! Error taxonomy for the voice session bridge.
//!
//! The three fatal kinds (`CredentialUnavailable`, `MediaCaptureDenied`,
//! `NegotiationRejected`) unwind the session to IDLE with all resources
//! released. Tool-bridge and malformed-event failures are non-fatal and are
//! handled inline by the router; they never surface here.

use crate::{signaling::SignalingError, transport::TransportError};

/// A fatal failure of `VoiceSession::start`, or a lifecycle misuse.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The Token Issuer could not provide an ephemeral credential.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[source] SignalingError),

    /// The local audio capture source could not be acquired.
    #[error("media capture denied: {0}")]
    MediaCaptureDenied(String),

    /// The transport could not be established or the remote endpoint rejected
    /// the offer/answer exchange.
    #[error("negotiation rejected: {0}")]
    NegotiationRejected(String),

    /// `start()` was called while a session was already CONNECTING or ACTIVE.
    #[error("a session is already starting or active")]
    AlreadyStarted,

    /// `stop()` was called while the session was still CONNECTING; the
    /// partially constructed transport has been released.
    #[error("session was stopped before becoming active")]
    StartAborted,
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::CaptureDenied(reason) => BridgeError::MediaCaptureDenied(reason),
            other => BridgeError::NegotiationRejected(other.to_string()),
        }
    }
}
