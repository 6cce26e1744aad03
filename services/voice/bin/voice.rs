//! Main entrypoint for the Civetta voice bridge.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the HTTP signaling and reasoning clients.
//! 3. Constructing the WebRTC transport factory and the voice session.
//! 4. Starting the call and mirroring its observable state to the log.
//! 5. Ending the call on Ctrl+C.

use anyhow::Context;
use civetta_core::{BridgeSettings, SessionDeps, SessionState, VoiceSession};
use civetta_voice::{
    config::Config,
    http::{HttpOfferExchange, HttpReasoningClient, HttpTokenIssuer},
    media::{DiscardPlayback, OpusTrackCapture, WebRtcTransportFactory},
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "voice", about = "Civetta realtime voice bridge")]
struct Args {
    /// Conversation id forwarded with every knowledge-base query.
    #[arg(long)]
    session_id: Option<String>,
}

/// Listens for the `Ctrl+C` signal to end the call gracefully.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Ending the call...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing voice session...");

    // --- 3. Initialize Collaborators ---
    let client = reqwest::Client::new();
    let deps = SessionDeps {
        issuer: Arc::new(HttpTokenIssuer::new(
            client.clone(),
            config.token_issuer_url.clone(),
        )),
        exchange: Arc::new(HttpOfferExchange::new(
            client.clone(),
            &config.realtime_url,
            &config.realtime_model,
        )),
        transports: Arc::new(WebRtcTransportFactory::new(
            Arc::new(OpusTrackCapture::new()),
            Arc::new(DiscardPlayback::new()),
        )),
        reasoning: Arc::new(HttpReasoningClient::new(
            client,
            config.reasoning_url.clone(),
        )),
    };

    let session_id = args
        .session_id
        .unwrap_or_else(|| format!("voice-{}", Uuid::new_v4()));
    let session = VoiceSession::new(session_id, deps, BridgeSettings::default());
    info!(session_id = %session.session_id(), model = %config.realtime_model, "Voice session ready");

    // --- 4. Mirror Observable State ---
    let mut state = session.watch_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            info!(state = ?*state.borrow(), "session state");
        }
    });
    let mut speaking = session.watch_agent_speaking();
    tokio::spawn(async move {
        while speaking.changed().await.is_ok() {
            info!(agent_speaking = *speaking.borrow(), "agent speaking");
        }
    });
    let mut transcript = session.watch_live_transcript();
    tokio::spawn(async move {
        while transcript.changed().await.is_ok() {
            info!(transcript = %*transcript.borrow(), "live transcript");
        }
    });

    // --- 5. Start the Call ---
    session.start().await.context("Failed to start the call")?;

    // --- 6. Run Until Shutdown or Remote Termination ---
    let mut state = session.watch_state();
    tokio::select! {
        _ = shutdown_signal() => {
            session.stop().await;
        }
        _ = state.wait_for(|s| *s == SessionState::Idle) => {
            info!("Call ended by the remote side.");
        }
    }

    info!("Voice bridge has shut down.");
    Ok(())
}
