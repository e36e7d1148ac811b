//! Core types shared by the transport and the chat core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tool activity reported by the assistant while it streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolEvent {
    /// The assistant started calling a tool
    Start {
        id: String,
        name: String,
        #[serde(default)]
        args: serde_json::Map<String, serde_json::Value>,
    },
    /// A tool call finished
    Result {
        id: String,
        result: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ToolEvent {
    /// The tool call id this event belongs to
    pub fn id(&self) -> &str {
        match self {
            ToolEvent::Start { id, .. } | ToolEvent::Result { id, .. } => id,
        }
    }
}

/// One increment of a streamed assistant response.
///
/// Every field is optional; a chunk usually carries exactly one of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamChunk {
    /// Text delta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether `text` is reasoning rather than answer text
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reasoning: bool,
    /// CLI session identifier, used to resume the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Tool start or result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolEvent>,
    /// Terminal success marker
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub complete: bool,
    /// Terminal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    /// Answer text delta
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            ..Default::default()
        }
    }

    /// Reasoning text delta
    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            reasoning: true,
            ..Default::default()
        }
    }

    /// Session identifier announcement
    pub fn session(id: impl Into<String>) -> Self {
        Self {
            session_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Tool call started
    pub fn tool_start(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            tool: Some(ToolEvent::Start {
                id: id.into(),
                name: name.into(),
                args,
            }),
            ..Default::default()
        }
    }

    /// Tool call finished
    pub fn tool_result(id: impl Into<String>, result: impl Into<String>, is_error: bool) -> Self {
        Self {
            tool: Some(ToolEvent::Result {
                id: id.into(),
                result: result.into(),
                is_error,
            }),
            ..Default::default()
        }
    }

    /// Successful end of the response
    pub fn complete() -> Self {
        Self {
            complete: true,
            ..Default::default()
        }
    }

    /// Failed end of the response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Check if this chunk ends the response
    pub fn is_terminal(&self) -> bool {
        self.complete || self.error.is_some()
    }

    /// Reasoning text carried by this chunk, if any
    pub fn reasoning_text(&self) -> Option<&str> {
        if self.reasoning {
            self.text.as_deref()
        } else {
            None
        }
    }
}

/// A single request to the assistant
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// User prompt
    pub prompt: String,
    /// Session to resume, if the CLI gave us one earlier
    pub session_id: Option<String>,
    /// Project directory the assistant works in
    pub project_path: Option<PathBuf>,
}

impl ChatRequest {
    /// Create a request for a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Resume an existing CLI session
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Run in a project directory
    pub fn with_project(mut self, project_path: Option<PathBuf>) -> Self {
        self.project_path = project_path;
        self
    }
}
