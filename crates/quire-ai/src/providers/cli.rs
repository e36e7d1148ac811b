//! Local assistant CLI provider

use std::process::Stdio;

use async_stream::stream;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    stream::{ChunkStream, StreamJsonParser},
    types::{ChatRequest, StreamChunk},
};

/// How the CLI is invoked
#[derive(Debug, Clone)]
pub struct CliOptions {
    /// Program name or path
    pub program: String,
    /// Model override passed as `--model`
    pub model: Option<String>,
    /// Ask the CLI for incremental `stream_event` deltas
    pub partial_messages: bool,
    /// Extra arguments appended verbatim
    pub extra_args: Vec<String>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: None,
            partial_messages: true,
            extra_args: vec![],
        }
    }
}

/// Spawns the assistant CLI once per request and streams its output
pub struct CliProvider {
    options: CliOptions,
}

impl CliProvider {
    /// Create a new provider
    pub fn new(options: CliOptions) -> Self {
        Self { options }
    }

    /// The options this provider runs with
    pub fn options(&self) -> &CliOptions {
        &self.options
    }

    /// Build the argument list for a request
    pub fn build_args(&self, request: &ChatRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if self.options.partial_messages {
            args.push("--include-partial-messages".to_string());
        }
        if let Some(session_id) = &request.session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(model) = &self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(self.options.extra_args.iter().cloned());
        args
    }

    /// Start the CLI and stream its response.
    ///
    /// Cancelling the token kills the child and ends the stream without a
    /// terminal chunk.
    pub fn stream(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ChunkStream> {
        let program = self.options.program.clone();
        let mut command = Command::new(&program);
        command
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.project_path {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::spawn(&program, e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn(&program, "stdout was not captured"))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        tracing::debug!("Spawned {} (pid {:?})", program, child.id());

        let chunks: ChunkStream = Box::pin(stream! {
            let mut parser = StreamJsonParser::new();
            let mut lines = BufReader::new(stdout).lines();

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    line = lines.next_line() => Some(line),
                };

                let Some(line) = next else {
                    tracing::debug!("Cancelled; killing {}", program);
                    let _ = child.kill().await;
                    return;
                };

                match line {
                    Ok(Some(line)) => {
                        for chunk in parser.parse_line(&line) {
                            yield chunk;
                        }
                        if parser.is_finished() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = child.kill().await;
                        yield StreamChunk::error(format!("failed to read {} output: {}", program, e));
                        return;
                    }
                }
            }

            let status = child.wait().await;
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            if !parser.is_finished() {
                let detail = stderr.trim();
                let message = match status {
                    Ok(status) if detail.is_empty() => {
                        format!("{} exited ({}) before finishing its response", program, status)
                    }
                    Ok(status) => format!("{} exited ({}): {}", program, status, detail),
                    Err(e) => format!("{} could not be awaited: {}", program, e),
                };
                tracing::error!("{}", message);
                yield StreamChunk::error(message);
            }
        });

        Ok(chunks)
    }
}
