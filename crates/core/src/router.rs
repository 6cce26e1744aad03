//! Control-event routing and the tool bridge.
//!
//! The router consumes channel events strictly in receipt order and applies
//! their presentation effects synchronously. Tool calls are the one event
//! kind that triggers outbound traffic: they are queued to a dedicated
//! worker so the reasoning round trip never blocks the event loop, and are
//! processed strictly one at a time.

use crate::{
    event::{ClientEvent, PendingToolCall, RemoteQueryArgs, ServerEvent, ToolOutcome},
    reasoning::ReasoningClient,
    transport::{ChannelEvent, MediaTransport},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Tool calls waiting for the bridge worker beyond this depth are rejected
/// with an immediate failure result so the model is never left unresumed.
pub(crate) const TOOL_QUEUE_DEPTH: usize = 8;

/// Everything the router needs to dispatch one session's events.
pub(crate) struct EventRouter {
    pub transport: Arc<dyn MediaTransport>,
    pub speaking: watch::Sender<bool>,
    pub transcript: watch::Sender<String>,
    pub tool_calls: mpsc::Sender<PendingToolCall>,
    pub remote_query_tool: String,
}

impl EventRouter {
    /// Drains the backlog of frames that raced ahead of the open signal,
    /// then runs until the channel terminates.
    pub(crate) async fn run(
        self,
        backlog: Vec<String>,
        mut events: mpsc::Receiver<ChannelEvent>,
    ) {
        for frame in backlog {
            self.handle_frame(&frame).await;
        }
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Frame(frame) => self.handle_frame(&frame).await,
                ChannelEvent::Closed => {
                    info!("control channel closed by remote end");
                    return;
                }
                // Already active; a duplicate open signal carries no state.
                ChannelEvent::Opened => {}
            }
        }
    }

    pub(crate) async fn handle_frame(&self, raw: &str) {
        let event = match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => event,
            Err(err) => {
                // Tolerance policy: malformed frames are dropped, the
                // session continues.
                warn!(%err, "dropping malformed control event");
                return;
            }
        };

        match event {
            ServerEvent::OutputAudioStarted => {
                self.speaking.send_replace(true);
            }
            ServerEvent::ResponseDone => {
                self.speaking.send_replace(false);
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.transcript.send_replace(transcript);
            }
            ServerEvent::OutputTranscriptDelta { delta } => {
                self.transcript.send_modify(|text| text.push_str(&delta));
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                self.dispatch_tool_call(PendingToolCall {
                    call_id,
                    name,
                    arguments,
                })
                .await;
            }
            ServerEvent::Unknown => {}
        }
    }

    async fn dispatch_tool_call(&self, call: PendingToolCall) {
        if call.name != self.remote_query_tool {
            warn!(name = %call.name, call_id = %call.call_id, "ignoring unrecognized tool call");
            return;
        }
        match self.tool_calls.try_send(call) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(call)) => {
                warn!(call_id = %call.call_id, "tool bridge queue full, rejecting call");
                send_tool_result(
                    &*self.transport,
                    &call.call_id,
                    ToolOutcome::failed("tool bridge busy"),
                )
                .await;
            }
            // Worker gone, session is tearing down.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Sequential worker that performs the reasoning round trip for each queued
/// tool call.
pub(crate) struct ToolBridge {
    pub transport: Arc<dyn MediaTransport>,
    pub reasoning: Arc<dyn ReasoningClient>,
    pub transcript: watch::Sender<String>,
    pub session_id: String,
    pub searching_status: String,
}

impl ToolBridge {
    pub(crate) async fn run(self, mut calls: mpsc::Receiver<PendingToolCall>) {
        while let Some(call) = calls.recv().await {
            self.handle(call).await;
        }
    }

    pub(crate) async fn handle(&self, call: PendingToolCall) {
        debug!(call_id = %call.call_id, "bridging tool call to reasoning backend");
        self.transcript.send_replace(self.searching_status.clone());

        let outcome = match serde_json::from_str::<RemoteQueryArgs>(&call.arguments) {
            Ok(args) => match self
                .reasoning
                .ask(&args.user_query, &self.session_id)
                .await
            {
                Ok(answer) => ToolOutcome::ok(answer),
                Err(err) => {
                    warn!(call_id = %call.call_id, %err, "reasoning round trip failed");
                    ToolOutcome::failed(err.to_string())
                }
            },
            Err(err) => {
                warn!(call_id = %call.call_id, %err, "tool call arguments did not parse");
                ToolOutcome::failed(format!("invalid tool arguments: {err}"))
            }
        };

        send_tool_result(&*self.transport, &call.call_id, outcome).await;
    }
}

/// Sends the function-call result followed by the resume instruction.
///
/// The resume frame is sent even when the result frame fails: the remote
/// session stalls indefinitely if it is left waiting for a tool result.
pub(crate) async fn send_tool_result(
    transport: &dyn MediaTransport,
    call_id: &str,
    outcome: ToolOutcome,
) {
    match ClientEvent::function_call_output(call_id, &outcome)
        .map_err(|err| err.to_string())
        .and_then(|event| serde_json::to_string(&event).map_err(|err| err.to_string()))
    {
        Ok(frame) => {
            if let Err(err) = transport.send_text(&frame).await {
                warn!(call_id, %err, "failed to send function_call_output");
            }
        }
        Err(err) => warn!(call_id, %err, "failed to encode function_call_output"),
    }

    match serde_json::to_string(&ClientEvent::ResponseCreate) {
        Ok(frame) => {
            if let Err(err) = transport.send_text(&frame).await {
                warn!(call_id, %err, "failed to send resume event");
            }
        }
        Err(err) => warn!(call_id, %err, "failed to encode resume event"),
    }
}
