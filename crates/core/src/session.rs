//! Session lifecycle controller.
//!
//! One `VoiceSession` owns at most one live transport at a time. `start`
//! drives the negotiator, waits for the control channel's open signal, and
//! hands the event stream to the router; `stop` is the single cancellation
//! mechanism and is safe at any point, including mid-negotiation. The
//! presentation outputs (`state`, `agentSpeaking`, `liveTranscript`) are
//! independently observable watch channels.

use crate::{
    error::BridgeError,
    negotiate,
    reasoning::ReasoningClient,
    router::{EventRouter, TOOL_QUEUE_DEPTH, ToolBridge},
    signaling::{OfferExchange, TokenIssuer},
    transport::{ChannelEvent, MediaTransport, TransportFactory},
};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

/// The three defined session states. There is no other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
}

/// The four external collaborators, injected as trait objects.
#[derive(Clone)]
pub struct SessionDeps {
    pub issuer: Arc<dyn TokenIssuer>,
    pub exchange: Arc<dyn OfferExchange>,
    pub transports: Arc<dyn TransportFactory>,
    pub reasoning: Arc<dyn ReasoningClient>,
}

/// Behavior knobs with UX-parity defaults carried over from the original
/// front-end (Spanish status strings).
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// The single tool name the bridge intercepts.
    pub remote_query_tool: String,
    /// Interim transcript shown while a tool round trip is in flight.
    pub searching_status: String,
    /// Transcript set when the session reaches ACTIVE.
    pub connected_status: String,
    /// Transcript set on stop or remote termination.
    pub ended_status: String,
    /// Transcript set when a connection attempt fails.
    pub error_status: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            remote_query_tool: "query_knowledge_base".to_string(),
            searching_status: "Buscando información...".to_string(),
            connected_status: "Conexión establecida. Di 'Hola' para comenzar.".to_string(),
            ended_status: "Llamada finalizada.".to_string(),
            error_status: "Hubo un error al conectar. Intenta nuevamente.".to_string(),
        }
    }
}

/// What a session attempt currently holds. Emptied exactly once per attempt.
#[derive(Default)]
struct CallSlot {
    transport: Option<Arc<dyn MediaTransport>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    session_id: String,
    deps: SessionDeps,
    settings: BridgeSettings,
    state: watch::Sender<SessionState>,
    speaking: watch::Sender<bool>,
    transcript: watch::Sender<String>,
    call: Mutex<CallSlot>,
}

/// The voice session bridge, scoped to one page/caller-supplied session id.
pub struct VoiceSession {
    inner: Arc<Inner>,
}

impl VoiceSession {
    pub fn new(session_id: impl Into<String>, deps: SessionDeps, settings: BridgeSettings) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (speaking, _) = watch::channel(false);
        let (transcript, _) = watch::channel(String::new());
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                deps,
                settings,
                state,
                speaking,
                transcript,
                call: Mutex::new(CallSlot::default()),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Whether the remote model is currently speaking.
    pub fn agent_speaking(&self) -> bool {
        *self.inner.speaking.borrow()
    }

    pub fn watch_agent_speaking(&self) -> watch::Receiver<bool> {
        self.inner.speaking.subscribe()
    }

    /// The live transcript (append-or-replace semantics per event type).
    pub fn live_transcript(&self) -> String {
        self.inner.transcript.borrow().clone()
    }

    pub fn watch_live_transcript(&self) -> watch::Receiver<String> {
        self.inner.transcript.subscribe()
    }

    /// Connects the session and returns once it is ACTIVE.
    ///
    /// Calling while already CONNECTING or ACTIVE is rejected with
    /// [`BridgeError::AlreadyStarted`]. On any failure the state is back to
    /// IDLE and every partially constructed resource has been released.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let entered = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(BridgeError::AlreadyStarted);
        }
        info!(session_id = %self.inner.session_id, "starting voice session");

        match self.inner.clone().connect().await {
            Ok(()) => Ok(()),
            Err(err) => {
                // A stop that interposed mid-connect already settled the
                // transcript; only genuine failures report the error status.
                let interrupted = matches!(err, BridgeError::StartAborted)
                    || *self.inner.state.borrow() != SessionState::Connecting;
                let status = if interrupted {
                    None
                } else {
                    warn!(session_id = %self.inner.session_id, %err, "voice session failed to connect");
                    Some(self.inner.settings.error_status.clone())
                };
                self.inner.teardown(status).await;
                Err(err)
            }
        }
    }

    /// Ends the session and releases the transport before returning.
    ///
    /// A no-op while IDLE; safe to call repeatedly and during CONNECTING.
    pub async fn stop(&self) {
        if *self.inner.state.borrow() == SessionState::Idle {
            return;
        }
        info!(session_id = %self.inner.session_id, "stopping voice session");
        self.inner
            .teardown(Some(self.inner.settings.ended_status.clone()))
            .await;
    }
}

impl Inner {
    async fn connect(self: Arc<Self>) -> Result<(), BridgeError> {
        let credential = negotiate::fetch_credential(&*self.deps.issuer).await?;
        self.ensure_connecting()?;

        let transport = self.deps.transports.create().await?;
        {
            let mut call = self.call.lock().await;
            if *self.state.borrow() != SessionState::Connecting {
                drop(call);
                transport.close().await;
                return Err(BridgeError::StartAborted);
            }
            call.transport = Some(transport.clone());
        }

        let mut events =
            negotiate::establish(&*transport, &*self.deps.exchange, &credential).await?;

        // The open signal is the authoritative ACTIVE trigger. Frames that
        // arrive before it are kept for the router, in order.
        let mut backlog = Vec::new();
        loop {
            match events.recv().await {
                Some(ChannelEvent::Opened) => break,
                Some(ChannelEvent::Frame(frame)) => backlog.push(frame),
                Some(ChannelEvent::Closed) | None => {
                    return if *self.state.borrow() == SessionState::Connecting {
                        Err(BridgeError::NegotiationRejected(
                            "control channel closed during setup".to_string(),
                        ))
                    } else {
                        Err(BridgeError::StartAborted)
                    };
                }
            }
        }
        self.ensure_connecting()?;

        let (tool_tx, tool_rx) = mpsc::channel(TOOL_QUEUE_DEPTH);
        let bridge = ToolBridge {
            transport: transport.clone(),
            reasoning: self.deps.reasoning.clone(),
            transcript: self.transcript.clone(),
            session_id: self.session_id.clone(),
            searching_status: self.settings.searching_status.clone(),
        };
        let router = EventRouter {
            transport: transport.clone(),
            speaking: self.speaking.clone(),
            transcript: self.transcript.clone(),
            tool_calls: tool_tx,
            remote_query_tool: self.settings.remote_query_tool.clone(),
        };

        let mut call = self.call.lock().await;
        if call.transport.is_none() {
            return Err(BridgeError::StartAborted);
        }
        self.state.send_replace(SessionState::Active);
        self.transcript
            .send_replace(self.settings.connected_status.clone());
        info!(session_id = %self.session_id, "voice session active");

        call.tasks.push(tokio::spawn(bridge.run(tool_rx)));
        let inner = self.clone();
        call.tasks.push(tokio::spawn(async move {
            router.run(backlog, events).await;
            // Remote termination: unwind exactly like a local stop.
            inner
                .teardown(Some(inner.settings.ended_status.clone()))
                .await;
        }));
        Ok(())
    }

    fn ensure_connecting(&self) -> Result<(), BridgeError> {
        if *self.state.borrow() == SessionState::Connecting {
            Ok(())
        } else {
            Err(BridgeError::StartAborted)
        }
    }

    /// Releases the call slot: closes the transport exactly once, stops the
    /// router and tool-bridge tasks, and settles the observable fields.
    async fn teardown(&self, status: Option<String>) {
        let (transport, tasks) = {
            let mut call = self.call.lock().await;
            (call.transport.take(), std::mem::take(&mut call.tasks))
        };
        // The transport must be fully released before Idle is published, so
        // a restart observing Idle can never find the old handle still live.
        if let Some(transport) = transport {
            transport.close().await;
        }
        self.state.send_replace(SessionState::Idle);
        self.speaking.send_replace(false);
        if let Some(status) = status {
            self.transcript.send_replace(status);
        }
        for task in tasks {
            task.abort();
        }
    }
}
