//! Chunk streams and the CLI `stream-json` line parser

use crate::types::StreamChunk;
use serde::Deserialize;
use std::pin::Pin;
use tokio_stream::Stream;

/// A stream of response chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// Converts the assistant CLI's `--output-format stream-json` lines into chunks.
///
/// When the CLI runs with partial messages enabled it sends both incremental
/// `stream_event` deltas and the full `assistant` message afterwards. Once a
/// delta has been seen, text and thinking blocks of full messages are ignored
/// so nothing is delivered twice.
#[derive(Debug, Default)]
pub struct StreamJsonParser {
    session_id: Option<String>,
    saw_partial: bool,
    saw_text: bool,
    finished: bool,
}

impl StreamJsonParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal chunk has been produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Parse one output line. Blank, unknown and malformed lines produce nothing.
    pub fn parse_line(&mut self, line: &str) -> Vec<StreamChunk> {
        let line = line.trim();
        if line.is_empty() || self.finished {
            return vec![];
        }

        let parsed: CliLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Skipping unparseable CLI output line: {}", e);
                return vec![];
            }
        };

        let mut chunks = Vec::new();
        match parsed {
            CliLine::System { session_id } => {
                self.note_session(session_id, &mut chunks);
            }
            CliLine::Assistant {
                message,
                session_id,
            } => {
                self.note_session(session_id, &mut chunks);
                for block in message.content.into_blocks() {
                    match block {
                        CliBlock::Text { text } if !self.saw_partial => {
                            self.saw_text = true;
                            chunks.push(StreamChunk::text(text));
                        }
                        CliBlock::Thinking { thinking } if !self.saw_partial => {
                            chunks.push(StreamChunk::reasoning(thinking));
                        }
                        CliBlock::ToolUse { id, name, input } => {
                            let args = match input {
                                serde_json::Value::Object(map) => map,
                                serde_json::Value::Null => serde_json::Map::new(),
                                other => {
                                    let mut map = serde_json::Map::new();
                                    map.insert("input".to_string(), other);
                                    map
                                }
                            };
                            chunks.push(StreamChunk::tool_start(id, name, args));
                        }
                        _ => {}
                    }
                }
            }
            CliLine::User { message } => {
                for block in message.content.into_blocks() {
                    if let CliBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } = block
                    {
                        chunks.push(StreamChunk::tool_result(
                            tool_use_id,
                            flatten_tool_content(&content),
                            is_error.unwrap_or(false),
                        ));
                    }
                }
            }
            CliLine::StreamEvent { event } => {
                let delta = match event.delta {
                    Some(delta) if event.event_type == "content_block_delta" => delta,
                    _ => return chunks,
                };
                match delta.delta_type.as_str() {
                    "text_delta" => {
                        self.saw_partial = true;
                        self.saw_text = true;
                        chunks.push(StreamChunk::text(delta.text.unwrap_or_default()));
                    }
                    "thinking_delta" => {
                        self.saw_partial = true;
                        chunks.push(StreamChunk::reasoning(delta.thinking.unwrap_or_default()));
                    }
                    _ => {}
                }
            }
            CliLine::Result {
                is_error,
                result,
                subtype,
                session_id,
            } => {
                self.note_session(session_id, &mut chunks);
                self.finished = true;
                if is_error {
                    let message = result
                        .filter(|r| !r.trim().is_empty())
                        .or(subtype)
                        .unwrap_or_else(|| "assistant reported an error".to_string());
                    chunks.push(StreamChunk::error(message));
                } else {
                    if let Some(text) = result.filter(|r| !self.saw_text && !r.is_empty()) {
                        chunks.push(StreamChunk::text(text));
                    }
                    chunks.push(StreamChunk::complete());
                }
            }
            CliLine::Unknown => {
                tracing::debug!("Ignoring CLI line of unknown type");
            }
        }
        chunks
    }

    fn note_session(&mut self, session_id: Option<String>, chunks: &mut Vec<StreamChunk>) {
        let Some(id) = session_id else {
            return;
        };
        if self.session_id.as_deref() != Some(id.as_str()) {
            self.session_id = Some(id.clone());
            chunks.push(StreamChunk::session(id));
        }
    }
}

/// Tool results arrive either as a string or as a list of text blocks
fn flatten_tool_content(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliLine {
    System {
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: CliMessage,
        #[serde(default)]
        session_id: Option<String>,
    },
    User {
        message: CliMessage,
    },
    StreamEvent {
        event: PartialEvent,
    },
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct CliMessage {
    #[serde(default)]
    content: CliContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CliContent {
    Plain(String),
    Blocks(Vec<CliBlock>),
}

impl Default for CliContent {
    fn default() -> Self {
        CliContent::Blocks(vec![])
    }
}

impl CliContent {
    fn into_blocks(self) -> Vec<CliBlock> {
        match self {
            CliContent::Plain(_) => vec![],
            CliContent::Blocks(blocks) => blocks,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct PartialEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<DeltaInfo>,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    thinking: Option<String>,
}
