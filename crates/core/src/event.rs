//! The JSON control-event vocabulary exchanged on the data channel.
//!
//! Inbound events carry a `type` tag from the realtime endpoint's fixed
//! vocabulary; everything the router does not recognize deserializes to
//! [`ServerEvent::Unknown`] and is ignored. Outbound events are the two
//! frames the tool bridge emits: the function-call result and the resume
//! instruction.

use serde::{Deserialize, Serialize};

/// An inbound control event, parsed from one text frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The model started emitting audio for its turn.
    #[serde(rename = "output_audio_buffer.started")]
    OutputAudioStarted,

    /// The model finished its turn.
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Finalized transcription of what the user said. Replaces the live
    /// transcript.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },

    /// Incremental speech-to-text of the model's own audio. Appended to the
    /// live transcript.
    #[serde(rename = "response.audio_transcript.delta")]
    OutputTranscriptDelta { delta: String },

    /// The model finished streaming the arguments of a function call and now
    /// waits for a matching result before it resumes.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        /// JSON-encoded argument object, as sent by the endpoint.
        arguments: String,
    },

    /// Any event type outside the vocabulary above. Forward-compatible: these
    /// must never crash the router.
    #[serde(other)]
    Unknown,
}

/// An outbound control event, serialized to one text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Injects the result of an intercepted function call into the remote
    /// conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: FunctionCallOutputItem },

    /// Instructs the model to resume speaking, using any tool results it has
    /// received.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Builds the result frame for a completed (or failed) tool call.
    pub fn function_call_output(call_id: &str, outcome: &ToolOutcome) -> serde_json::Result<Self> {
        Ok(ClientEvent::ConversationItemCreate {
            item: FunctionCallOutputItem {
                item_type: "function_call_output",
                call_id: call_id.to_string(),
                output: serde_json::to_string(outcome)?,
            },
        })
    }
}

/// The `item` payload of a `conversation.item.create` frame.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallOutputItem {
    #[serde(rename = "type")]
    item_type: &'static str,
    pub call_id: String,
    /// JSON-encoded [`ToolOutcome`]; the endpoint expects a string here, not
    /// a nested object.
    pub output: String,
}

/// Result of one reasoning round trip, encoded into the `output` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(answer: impl Into<String>) -> Self {
        Self {
            success: true,
            answer: Some(answer.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: None,
            error: Some(error.into()),
        }
    }
}

/// A function call lifted out of a `FunctionCallArgumentsDone` event, alive
/// until its result has been sent back over the channel.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Argument object of the recognized remote-query tool.
#[derive(Debug, Deserialize)]
pub struct RemoteQueryArgs {
    pub user_query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_audio_started() {
        let raw = r#"{"type":"output_audio_buffer.started","event_id":"ev_1"}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ServerEvent::OutputAudioStarted));
    }

    #[test]
    fn parses_response_done() {
        let raw = r#"{"type":"response.done","response":{"id":"resp_1","status":"completed"}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ServerEvent::ResponseDone));
    }

    #[test]
    fn parses_input_transcription_completed() {
        let raw = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_1",
            "transcript": "buenas tardes"
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "buenas tardes");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_output_transcript_delta() {
        let raw = r#"{"type":"response.audio_transcript.delta","delta":", ¿cómo"}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::OutputTranscriptDelta { delta } => assert_eq!(delta, ", ¿cómo"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_function_call_arguments_done() {
        let raw = r#"{
            "type": "response.function_call_arguments.done",
            "call_id": "call_abc",
            "name": "query_knowledge_base",
            "arguments": "{\"user_query\":\"vestidos de novia\"}"
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                assert_eq!(call_id, "call_abc");
                assert_eq!(name, "query_knowledge_base");
                let args: RemoteQueryArgs = serde_json::from_str(&arguments).unwrap();
                assert_eq!(args.user_query, "vestidos de novia");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let raw = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let raw = r#"{"type":"response.audio_transcript.delta"}"#;
        assert!(serde_json::from_str::<ServerEvent>(raw).is_err());
    }

    #[test]
    fn serializes_function_call_output_frame() {
        let event =
            ClientEvent::function_call_output("call_1", &ToolOutcome::ok("Civetta ofrece..."))
                .unwrap();
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");

        let output: ToolOutcome =
            serde_json::from_str(value["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(output, ToolOutcome::ok("Civetta ofrece..."));
    }

    #[test]
    fn serializes_resume_frame() {
        let value = serde_json::to_value(ClientEvent::ResponseCreate).unwrap();
        assert_eq!(value, serde_json::json!({"type": "response.create"}));
    }

    #[test]
    fn failed_outcome_has_no_answer_field() {
        let value = serde_json::to_value(ToolOutcome::failed("backend down")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "backend down");
        assert!(value.get("answer").is_none());
    }
}
