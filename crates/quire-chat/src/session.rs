//! Chat session: drives one response at a time through the router and the
//! conversation reducer.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use quire_ai::{ChatRequest, ChunkStream, StreamChunk};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::{ChatMessage, Conversation},
    detect::Detector,
    error::{Error, Result},
    events::SessionEvent,
    handle::SessionHandle,
    plans::{PlanStore, extract_name_from_content},
    router::{DEFAULT_PLAN_NAME, RouteEvent, RouterConfig, StreamRouter},
    transport::Transport,
};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory the assistant works in and plans are written under
    pub project_path: PathBuf,
    /// Routing thresholds
    pub router: RouterConfig,
    /// Plan detector
    pub detector: Detector,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            router: RouterConfig::default(),
            detector: Detector::default(),
        }
    }
}

/// How a response ended
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// An ordinary chat answer
    Chat { message: ChatMessage },
    /// A plan; `message` is the chat message it superseded
    Plan {
        name: String,
        content: String,
        message: ChatMessage,
    },
    /// Cancelled before completion
    Cancelled,
}

/// The plan file writer for the current response
struct ActivePlan {
    updates: mpsc::UnboundedSender<String>,
    written_len: usize,
}

/// Marks the handle idle even when a `send` future is dropped mid-stream
struct RunGuard(SessionHandle);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// A conversation with the assistant
pub struct ChatSession {
    config: SessionConfig,
    conversation: Conversation,
    transport: Arc<dyn Transport>,
    plan_store: Arc<dyn PlanStore>,
    event_tx: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
    resume_id: Option<String>,
    plan_writes: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Create a new session
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        plan_store: Arc<dyn PlanStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            conversation: Conversation::new(),
            transport,
            plan_store,
            event_tx,
            handle: SessionHandle::new(),
            resume_id: None,
            plan_writes: vec![],
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Conversation state
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// CLI session id the next request resumes
    pub fn session_id(&self) -> Option<&str> {
        self.resume_id.as_deref()
    }

    /// Get a cloneable handle for cancelling from other tasks
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Cancel the running response
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Whether a response is streaming
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Drop the conversation and forget the CLI session
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.resume_id = None;
    }

    /// Wait for queued plan file writes to finish
    pub async fn flush_plan_writes(&mut self) {
        for task in self.plan_writes.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Plan writer task failed: {}", e);
            }
        }
    }

    /// Send a prompt and stream the response to completion
    pub async fn send(&mut self, prompt: &str) -> Result<TurnOutcome> {
        let Some(cancel) = self.handle.begin() else {
            return Err(Error::Busy);
        };
        let _guard = RunGuard(self.handle.clone());
        self.plan_writes.retain(|task| !task.is_finished());
        self.run_turn(prompt, cancel).await
    }

    async fn run_turn(&mut self, prompt: &str, cancel: CancellationToken) -> Result<TurnOutcome> {
        self.conversation.push_user(prompt);
        let message_id = self.conversation.begin_assistant().id.clone();
        let _ = self.event_tx.send(SessionEvent::ResponseStart {
            message_id: message_id.clone(),
        });

        let request = ChatRequest::new(prompt)
            .with_session(self.resume_id.clone())
            .with_project(Some(self.config.project_path.clone()));

        let mut chunks: ChunkStream = match self.transport.stream(request, cancel.clone()).await {
            Ok(s) => s,
            Err(e) => {
                self.record_failure(&e.to_string());
                return Err(e.into());
            }
        };

        let mut router = StreamRouter::new(self.config.detector.clone(), self.config.router.clone());
        let mut plan: Option<ActivePlan> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = chunks.next() => Some(chunk),
            };

            let Some(chunk) = next else {
                tracing::debug!("Response {} cancelled", message_id);
                self.conversation.cancel();
                let _ = self.event_tx.send(SessionEvent::Cancelled { message_id });
                return Ok(TurnOutcome::Cancelled);
            };

            let Some(chunk) = chunk else {
                return Err(self.fail("stream ended before the response completed"));
            };

            let StreamChunk {
                text,
                reasoning,
                session_id,
                tool,
                complete,
                error,
            } = chunk;

            if let Some(id) = session_id {
                self.resume_id = Some(id);
            }
            if let Some(tool) = tool {
                self.apply_tool(tool);
            }
            if let Some(text) = text {
                if reasoning {
                    self.conversation.append_reasoning(&text);
                    let _ = self.event_tx.send(SessionEvent::ReasoningDelta {
                        message_id: message_id.clone(),
                        delta: text,
                    });
                } else if let Some(route) = router.push(&text) {
                    self.apply_route(route, &message_id, &mut plan);
                }
            }
            if let Some(error) = error {
                return Err(self.fail(&error));
            }
            if complete {
                return self.complete(&mut router, &message_id, plan);
            }
        }
    }

    fn apply_tool(&mut self, tool: quire_ai::ToolEvent) {
        let event = match &tool {
            quire_ai::ToolEvent::Start { id, name, args } => SessionEvent::ToolStart {
                tool_call_id: id.clone(),
                name: name.clone(),
                arguments: args.clone(),
            },
            quire_ai::ToolEvent::Result {
                id,
                result,
                is_error,
            } => SessionEvent::ToolEnd {
                tool_call_id: id.clone(),
                result: result.clone(),
                is_error: *is_error,
            },
        };
        self.conversation.apply_tool(tool);
        let _ = self.event_tx.send(event);
    }

    fn apply_route(&mut self, route: RouteEvent, message_id: &str, plan: &mut Option<ActivePlan>) {
        match route {
            RouteEvent::Chat(delta) => {
                self.conversation.append_text(&delta);
                let _ = self.event_tx.send(SessionEvent::TextDelta {
                    message_id: message_id.to_string(),
                    delta,
                });
            }
            RouteEvent::PlanStart {
                content,
                title,
                confidence,
            } => {
                let name = title
                    .or_else(|| self.config.detector.extract_title(&content))
                    .or_else(|| extract_name_from_content(&content))
                    .unwrap_or_else(|| DEFAULT_PLAN_NAME.to_string());
                tracing::info!("Plan detected: {} (confidence {:.2})", name, confidence);

                self.conversation.mark_routed_to_plan();
                let _ = self.event_tx.send(SessionEvent::PlanDetected {
                    name: name.clone(),
                    confidence,
                    content: content.clone(),
                });
                *plan = Some(self.spawn_plan_writer(name, content));
            }
            RouteEvent::Plan(delta) => {
                let _ = self.event_tx.send(SessionEvent::PlanDelta { delta });
            }
            RouteEvent::ChatComplete { .. } | RouteEvent::PlanComplete { .. } => {}
        }
    }

    fn complete(
        &mut self,
        router: &mut StreamRouter,
        message_id: &str,
        mut plan: Option<ActivePlan>,
    ) -> Result<TurnOutcome> {
        let mut finished_plan = None;
        for route in router.finish() {
            match route {
                RouteEvent::PlanComplete { name, content } => {
                    if let Some(active) = &plan {
                        if active.written_len != content.len() {
                            let _ = active.updates.send(content.clone());
                        }
                    }
                    let _ = self.event_tx.send(SessionEvent::PlanComplete {
                        name: name.clone(),
                        content: content.clone(),
                    });
                    finished_plan = Some((name, content));
                }
                RouteEvent::ChatComplete { .. } => {}
                other => self.apply_route(other, message_id, &mut plan),
            }
        }

        let message = self
            .conversation
            .finalize()
            .ok_or_else(|| Error::Other("no active response to finalize".to_string()))?;
        let _ = self.event_tx.send(SessionEvent::MessageComplete {
            message: message.clone(),
        });

        Ok(match finished_plan {
            Some((name, content)) => TurnOutcome::Plan {
                name,
                content,
                message,
            },
            None => TurnOutcome::Chat { message },
        })
    }

    /// Queue the plan file: created now, updated with each later content sent
    /// through the returned channel.
    fn spawn_plan_writer(&mut self, name: String, content: String) -> ActivePlan {
        let (updates, mut rx) = mpsc::unbounded_channel::<String>();
        let written_len = content.len();
        let store = Arc::clone(&self.plan_store);
        let project = self.config.project_path.clone();
        let events = self.event_tx.clone();

        let task = tokio::spawn(async move {
            let file_name = match store.create_plan_file(&project, &name, &content).await {
                Ok(file_name) => {
                    let _ = events.send(SessionEvent::PlanFileCreated {
                        name: name.clone(),
                        file_name: file_name.clone(),
                    });
                    file_name
                }
                Err(e) => {
                    tracing::error!("Failed to create plan file for {}: {}", name, e);
                    let _ = events.send(SessionEvent::PlanFileFailed {
                        name,
                        message: e.to_string(),
                    });
                    return;
                }
            };

            while let Some(content) = rx.recv().await {
                if let Err(e) = store.update_plan_file(&project, &file_name, &content).await {
                    tracing::error!("Failed to update plan file {}: {}", file_name, e);
                    let _ = events.send(SessionEvent::PlanFileFailed {
                        name: name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        });
        self.plan_writes.push(task);

        ActivePlan {
            updates,
            written_len,
        }
    }

    fn record_failure(&mut self, message: &str) {
        tracing::error!("Response failed: {}", message);
        self.conversation.fail(message);
        let _ = self.event_tx.send(SessionEvent::Error {
            message: message.to_string(),
        });
    }

    fn fail(&mut self, message: &str) -> Error {
        self.record_failure(message);
        Error::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Status, ToolStatus};
    use crate::plans::generate_file_name;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;

    const PLAN_CHUNKS: [&str; 4] = [
        "Sure, ",
        "here's the plan: ",
        "# Feature Plan\n",
        "## Phase 1\n- [ ] step one\n- [ ] step two\n- [ ] step three",
    ];

    struct MockTransport {
        chunks: Vec<StreamChunk>,
        /// Cancel the token instead of yielding the chunk at this index
        cancel_at: Option<usize>,
        open_error: Option<String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockTransport {
        fn new(chunks: Vec<StreamChunk>) -> Self {
            Self {
                chunks,
                cancel_at: None,
                open_error: None,
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn stream(
            &self,
            request: ChatRequest,
            cancel: CancellationToken,
        ) -> quire_ai::Result<ChunkStream> {
            self.requests.lock().push(request);
            if let Some(message) = &self.open_error {
                return Err(quire_ai::Error::CliUnavailable(message.clone()));
            }
            let chunks = self.chunks.clone();
            let cancel_at = self.cancel_at;
            let stream: ChunkStream = Box::pin(async_stream::stream! {
                for (i, chunk) in chunks.into_iter().enumerate() {
                    if cancel_at == Some(i) {
                        cancel.cancel();
                        futures::future::pending::<()>().await;
                    }
                    yield chunk;
                }
            });
            Ok(stream)
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        creates: Mutex<Vec<(String, String)>>,
        updates: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl PlanStore for RecordingStore {
        async fn create_plan_file(
            &self,
            _project_path: &Path,
            name: &str,
            content: &str,
        ) -> Result<String> {
            if self.fail {
                return Err(Error::PlanStore("disk full".into()));
            }
            self.creates.lock().push((name.to_string(), content.to_string()));
            Ok(generate_file_name(name))
        }

        async fn update_plan_file(
            &self,
            _project_path: &Path,
            file_name: &str,
            content: &str,
        ) -> Result<()> {
            self.updates
                .lock()
                .push((file_name.to_string(), content.to_string()));
            Ok(())
        }
    }

    fn text_chunks(texts: &[&str]) -> Vec<StreamChunk> {
        texts.iter().map(|t| StreamChunk::text(*t)).collect()
    }

    fn session(transport: MockTransport) -> (ChatSession, Arc<MockTransport>, Arc<RecordingStore>) {
        session_with_store(transport, RecordingStore::default())
    }

    fn session_with_store(
        transport: MockTransport,
        store: RecordingStore,
    ) -> (ChatSession, Arc<MockTransport>, Arc<RecordingStore>) {
        let transport = Arc::new(transport);
        let store = Arc::new(store);
        let session = ChatSession::new(
            SessionConfig::default(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&store) as Arc<dyn PlanStore>,
        );
        (session, transport, store)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_plan_response_routes_to_plan() {
        let mut chunks = vec![StreamChunk::session("sess-1")];
        chunks.extend(text_chunks(&PLAN_CHUNKS));
        chunks.push(StreamChunk::complete());
        let (mut session, _, store) = session(MockTransport::new(chunks));
        let mut rx = session.subscribe();

        let outcome = session.send("plan a feature").await.unwrap();
        session.flush_plan_writes().await;

        let full = PLAN_CHUNKS.concat();
        match outcome {
            TurnOutcome::Plan {
                name,
                content,
                message,
            } => {
                // "# Feature Plan" is mid-line, so the title is the first heading
                assert_eq!(name, "Phase 1");
                assert_eq!(content, full);
                assert!(message.routed_to_plan);
                assert!(message.is_complete);
            }
            other => panic!("expected a plan, got {:?}", other),
        }

        // the plan sink got the full text exactly once
        let creates = store.creates.lock().clone();
        assert_eq!(creates, vec![("Phase 1".to_string(), full.clone())]);
        assert!(store.updates.lock().is_empty());

        let events = drain(&mut rx);
        let detected = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PlanDetected { .. }))
            .count();
        assert_eq!(detected, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::PlanFileCreated { file_name, .. } if file_name == "phase-1.md"
        )));
        assert!(events.iter().any(|e| e.is_terminal()));
        assert_eq!(session.session_id(), Some("sess-1"));
        assert_eq!(session.conversation().status(), Status::Idle);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_plan_decided_mid_stream() {
        let mut texts = PLAN_CHUNKS.to_vec();
        texts.push("\n- [ ] step four\n\n## Phase 2\n- [ ] step five");
        texts.push("\n- [ ] step six");
        let mut chunks = text_chunks(&texts);
        chunks.push(StreamChunk::complete());
        let (mut session, _, store) = session(MockTransport::new(chunks));
        let mut rx = session.subscribe();

        session.send("plan").await.unwrap();
        session.flush_plan_writes().await;

        // chat kept only what was forwarded before the decision
        let message = &session.conversation().messages()[1];
        assert_eq!(message.content, texts[..4].concat());
        assert!(message.routed_to_plan);

        let creates = store.creates.lock().clone();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].1, texts[..5].concat());
        let updates = store.updates.lock().clone();
        assert_eq!(updates, vec![("phase-1.md".to_string(), texts.concat())]);

        let events = drain(&mut rx);
        let plan_deltas: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PlanDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(plan_deltas, vec!["\n- [ ] step six"]);
        let text_deltas = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::TextDelta { .. }))
            .count();
        assert_eq!(text_deltas, 4);
    }

    #[tokio::test]
    async fn test_chat_response_with_tools_and_reasoning() {
        let answer = "Ownership means each value has exactly one owner. ".repeat(4);
        let chunks = vec![
            StreamChunk::session("sess-2"),
            StreamChunk::reasoning("Thinking about "),
            StreamChunk::reasoning("ownership."),
            StreamChunk::tool_start("t1", "read_file", serde_json::Map::new()),
            StreamChunk::tool_result("t1", "no such file", true),
            StreamChunk::text(answer.clone()),
            StreamChunk::complete(),
        ];
        let (mut session, transport, store) = session(MockTransport::new(chunks));

        let outcome = session.send("explain ownership").await.unwrap();
        let message = match outcome {
            TurnOutcome::Chat { message } => message,
            other => panic!("expected chat, got {:?}", other),
        };
        assert_eq!(message.content, answer);
        assert!(!message.routed_to_plan);
        assert_eq!(message.reasoning.len(), 1);
        assert_eq!(message.reasoning[0].content, "Thinking about ownership.");
        assert!(message.reasoning[0].is_complete);
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].status, ToolStatus::Error);

        session.flush_plan_writes().await;
        assert!(store.creates.lock().is_empty());

        // the next request resumes the CLI session
        session.send("and borrowing?").await.unwrap();
        let requests = transport.requests.lock().clone();
        assert_eq!(requests[0].session_id, None);
        assert_eq!(requests[1].session_id.as_deref(), Some("sess-2"));
        assert_eq!(session.conversation().messages().len(), 4);

        session.clear();
        assert!(session.conversation().messages().is_empty());
        assert_eq!(session.session_id(), None);
    }

    #[tokio::test]
    async fn test_cancel_before_decision_writes_nothing() {
        let mut chunks = text_chunks(&PLAN_CHUNKS);
        chunks.push(StreamChunk::complete());
        let mut transport = MockTransport::new(chunks);
        transport.cancel_at = Some(2);
        let (mut session, _, store) = session(transport);
        let mut rx = session.subscribe();

        let outcome = session.send("plan").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Cancelled));
        session.flush_plan_writes().await;

        assert!(store.creates.lock().is_empty());
        let message = &session.conversation().messages()[1];
        assert_eq!(message.content, "Sure, here's the plan: ");
        assert!(!message.is_complete);
        assert_eq!(session.conversation().status(), Status::Idle);
        assert!(!session.is_running());

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SessionEvent::Cancelled { .. })));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::MessageComplete { .. }))
        );
    }

    #[tokio::test]
    async fn test_transport_error_chunk() {
        let chunks = vec![StreamChunk::text("partial "), StreamChunk::error("overloaded")];
        let (mut session, _, _) = session(MockTransport::new(chunks));
        let mut rx = session.subscribe();

        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "overloaded"));

        let conv = session.conversation();
        assert_eq!(conv.status(), Status::Error);
        assert_eq!(conv.messages()[1].content, "partial \n\nError: overloaded");
        assert!(matches!(
            drain(&mut rx).last(),
            Some(SessionEvent::Error { message }) if message == "overloaded"
        ));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_stream_without_terminal_chunk_is_an_error() {
        let (mut session, _, _) = session(MockTransport::new(text_chunks(&["hello"])));
        let err = session.send("hi").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(session.conversation().status(), Status::Error);
    }

    #[tokio::test]
    async fn test_unavailable_cli() {
        let mut transport = MockTransport::new(vec![]);
        transport.open_error = Some("claude not found".into());
        let (mut session, _, _) = session(transport);

        let err = session.send("hi").await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(
            session.conversation().last_error(),
            Some("Assistant CLI unavailable: claude not found")
        );
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_stream() {
        let mut chunks = text_chunks(&PLAN_CHUNKS);
        chunks.push(StreamChunk::complete());
        let store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        let (mut session, _, _) = session_with_store(MockTransport::new(chunks), store);
        let mut rx = session.subscribe();

        let outcome = session.send("plan").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Plan { .. }));
        session.flush_plan_writes().await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::PlanFileFailed { message, .. } if message.contains("disk full")
        )));
        assert_eq!(session.conversation().status(), Status::Idle);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_send() {
        let (mut session, transport, _) = session(MockTransport::new(vec![StreamChunk::complete()]));
        let _token = session.handle().begin().unwrap();

        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, Error::Busy));
        assert!(transport.requests.lock().is_empty());
        assert!(session.conversation().messages().is_empty());
    }

    #[tokio::test]
    async fn test_abort_from_handle() {
        struct Endless;

        #[async_trait]
        impl Transport for Endless {
            async fn stream(
                &self,
                _request: ChatRequest,
                _cancel: CancellationToken,
            ) -> quire_ai::Result<ChunkStream> {
                let stream: ChunkStream = Box::pin(async_stream::stream! {
                    yield StreamChunk::text("thinking out loud");
                    futures::future::pending::<()>().await;
                });
                Ok(stream)
            }
        }

        let mut session = ChatSession::new(
            SessionConfig::default(),
            Arc::new(Endless),
            Arc::new(RecordingStore::default()),
        );
        let handle = session.handle();
        let aborter = tokio::spawn(async move {
            while !handle.is_running() {
                tokio::task::yield_now().await;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.abort();
        });

        let outcome = session.send("go").await.unwrap();
        aborter.await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Cancelled));
        assert_eq!(
            session.conversation().messages()[1].content,
            "thinking out loud"
        );
    }
}
