//! Core logic for the Civetta voice session bridge.
//!
//! This crate is transport-agnostic: the peer media connection, the HTTP
//! signaling endpoints, and the reasoning backend are all reached through
//! trait seams so the state machine and event routing can be exercised with
//! scripted doubles. The runnable wiring (WebRTC, `reqwest`) lives in the
//! `civetta-voice` service crate.
//!
//! - `event`: the JSON control-event vocabulary exchanged on the data channel.
//! - `signaling`: the Token Issuer and offer/answer exchange interfaces.
//! - `transport`: the peer media/data transport abstraction.
//! - `reasoning`: the backend that answers intercepted tool calls.
//! - `session`: the IDLE/CONNECTING/ACTIVE lifecycle controller.
//! - `router`: inbound event dispatch and the tool bridge.

pub mod error;
pub mod event;
mod negotiate;
pub mod reasoning;
mod router;
pub mod session;
pub mod signaling;
pub mod transport;

pub use error::BridgeError;
pub use session::{BridgeSettings, SessionDeps, SessionState, VoiceSession};
