//! Conversation state: messages, reasoning, tool calls and streaming status.
//!
//! [`Conversation`] is a plain reducer. It is owned by one task and driven by
//! stream events; nothing here is shared or locked.

use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A run of reasoning text. Only the last block of a message grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningBlock {
    pub id: String,
    pub content: String,
    pub is_complete: bool,
}

/// Lifecycle of a tool invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    /// Completed or failed
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }
}

/// A tool call made by the assistant while answering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    pub result: Option<String>,
    pub is_error: Option<bool>,
    pub status: ToolStatus,
}

/// One entry in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    /// Text shown in chat. Append-only while streaming.
    pub content: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    #[serde(default)]
    pub reasoning: Vec<ReasoningBlock>,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
    /// The response turned out to be a plan; chat should hide `content`
    #[serde(default)]
    pub routed_to_plan: bool,
    /// Diagnostic for a failed response
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            reasoning: vec![],
            tool_calls: vec![],
            routed_to_plan: false,
            error: None,
            is_complete: false,
        }
    }

    /// Look up a tool invocation by id
    pub fn tool(&self, id: &str) -> Option<&ToolInvocation> {
        self.tool_calls.iter().find(|t| t.id == id)
    }

    /// Concatenated reasoning text
    pub fn reasoning_text(&self) -> String {
        self.reasoning.iter().map(|b| b.content.as_str()).collect()
    }

    fn close_reasoning(&mut self) {
        if let Some(last) = self.reasoning.last_mut() {
            last.is_complete = true;
        }
    }
}

/// Streaming status of the conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    Streaming,
    Error,
}

/// Ordered messages plus the response currently streaming into the last one
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    active: Option<usize>,
    status: Status,
    error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Last recorded error
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The assistant message currently streaming
    pub fn active_message(&self) -> Option<&ChatMessage> {
        self.active.and_then(|i| self.messages.get(i))
    }

    fn active_mut(&mut self) -> Option<&mut ChatMessage> {
        match self.active {
            Some(i) => self.messages.get_mut(i),
            None => None,
        }
    }

    /// Append a user message
    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        let mut message = ChatMessage::new(Role::User, content);
        message.is_complete = true;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Append an empty assistant message and start streaming into it.
    ///
    /// A response that was never finalized is abandoned as if cancelled.
    pub fn begin_assistant(&mut self) -> &ChatMessage {
        if self.active.is_some() {
            tracing::debug!("Abandoning unfinished response");
            self.cancel();
        }
        self.messages.push(ChatMessage::new(Role::Assistant, ""));
        let index = self.messages.len() - 1;
        self.active = Some(index);
        self.status = Status::Streaming;
        self.error = None;
        &self.messages[index]
    }

    /// Append answer text to the active message
    pub fn append_text(&mut self, delta: &str) {
        let Some(message) = self.active_mut() else {
            tracing::debug!("Dropping text with no active response");
            return;
        };
        message.close_reasoning();
        message.content.push_str(delta);
    }

    /// Extend the open reasoning block, or start a new one
    pub fn append_reasoning(&mut self, delta: &str) {
        let Some(message) = self.active_mut() else {
            return;
        };
        match message.reasoning.last_mut() {
            Some(block) if !block.is_complete => block.content.push_str(delta),
            _ => message.reasoning.push(ReasoningBlock {
                id: uuid::Uuid::new_v4().to_string(),
                content: delta.to_string(),
                is_complete: false,
            }),
        }
    }

    /// Record that a tool call started. A repeated start for a running call
    /// refreshes its name and arguments; a finished call is left alone.
    pub fn start_tool(
        &mut self,
        id: &str,
        name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) {
        let Some(message) = self.active_mut() else {
            return;
        };
        message.close_reasoning();
        match message.tool_calls.iter_mut().find(|t| t.id == id) {
            Some(tool) if tool.status.is_terminal() => {
                tracing::debug!("Ignoring start for finished tool call {}", id);
            }
            Some(tool) => {
                tool.name = name.to_string();
                tool.args = args;
                tool.status = ToolStatus::Running;
            }
            None => message.tool_calls.push(ToolInvocation {
                id: id.to_string(),
                name: name.to_string(),
                args,
                result: None,
                is_error: None,
                status: ToolStatus::Running,
            }),
        }
    }

    /// Record a tool result, inserting the invocation if its start was missed
    pub fn resolve_tool(&mut self, id: &str, result: &str, is_error: bool) {
        let Some(message) = self.active_mut() else {
            return;
        };
        let status = if is_error {
            ToolStatus::Error
        } else {
            ToolStatus::Completed
        };
        match message.tool_calls.iter_mut().find(|t| t.id == id) {
            Some(tool) => {
                tool.result = Some(result.to_string());
                tool.is_error = Some(is_error);
                tool.status = status;
            }
            None => message.tool_calls.push(ToolInvocation {
                id: id.to_string(),
                name: String::new(),
                args: serde_json::Map::new(),
                result: Some(result.to_string()),
                is_error: Some(is_error),
                status,
            }),
        }
    }

    /// Apply a tool event from the stream
    pub fn apply_tool(&mut self, event: quire_ai::ToolEvent) {
        match event {
            quire_ai::ToolEvent::Start { id, name, args } => self.start_tool(&id, &name, args),
            quire_ai::ToolEvent::Result {
                id,
                result,
                is_error,
            } => self.resolve_tool(&id, &result, is_error),
        }
    }

    /// Flag the active message as superseded by a plan
    pub fn mark_routed_to_plan(&mut self) {
        if let Some(message) = self.active_mut() {
            message.routed_to_plan = true;
        }
    }

    /// End the active response with an error. The diagnostic is appended to
    /// the message so it stays visible.
    pub fn fail(&mut self, error: &str) {
        if let Some(message) = self.active_mut() {
            if !message.content.is_empty() {
                message.content.push_str("\n\n");
            }
            message.content.push_str("Error: ");
            message.content.push_str(error);
            message.error = Some(error.to_string());
            message.close_reasoning();
        }
        self.active = None;
        self.status = Status::Error;
        self.error = Some(error.to_string());
    }

    /// Freeze the active message. Returns it the first time only.
    pub fn finalize(&mut self) -> Option<ChatMessage> {
        let index = self.active.take()?;
        self.status = Status::Idle;
        let message = self.messages.get_mut(index)?;
        message.close_reasoning();
        message.is_complete = true;
        Some(message.clone())
    }

    /// Stop streaming without finalizing. The message keeps what it has.
    pub fn cancel(&mut self) {
        self.active = None;
        self.status = Status::Idle;
    }

    /// Drop all messages and state
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
