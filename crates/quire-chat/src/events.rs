//! Session event types

use serde::{Deserialize, Serialize};

use crate::conversation::ChatMessage;

/// Events emitted while a session streams a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// An assistant message was created for a new response
    ResponseStart { message_id: String },

    /// Answer text was appended to the chat message
    TextDelta { message_id: String, delta: String },

    /// Reasoning text was appended
    ReasoningDelta { message_id: String, delta: String },

    /// A tool call started
    ToolStart {
        tool_call_id: String,
        name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },

    /// A tool call finished
    ToolEnd {
        tool_call_id: String,
        result: String,
        is_error: bool,
    },

    /// The response is a plan; `content` is all text so far
    PlanDetected {
        name: String,
        confidence: f64,
        content: String,
    },

    /// Text appended to the plan
    PlanDelta { delta: String },

    /// The plan response finished
    PlanComplete { name: String, content: String },

    /// The plan file was written
    PlanFileCreated { name: String, file_name: String },

    /// Writing the plan file failed
    PlanFileFailed { name: String, message: String },

    /// The assistant message was finalized
    MessageComplete { message: ChatMessage },

    /// The response was cancelled
    Cancelled { message_id: String },

    /// The response failed
    Error { message: String },
}

impl SessionEvent {
    /// Check if this event ends a response
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::MessageComplete { .. }
                | SessionEvent::Cancelled { .. }
                | SessionEvent::Error { .. }
        )
    }
}
