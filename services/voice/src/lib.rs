//! Production wiring for the Civetta voice bridge.
//!
//! `civetta-core` defines the session logic against trait seams; this crate
//! supplies the real HTTP signaling clients, the WebRTC transport, and the
//! environment-driven configuration behind them.

pub mod config;
pub mod http;
pub mod media;
