//! Per-response routing between the chat message and the plan editor
//!
//! A [`StreamRouter`] sees every answer-text chunk of one response in arrival
//! order. Until it has decided, text is forwarded optimistically to chat; once
//! the stream looks like a plan it latches into [`RouteState::Plan`], hands the
//! whole accumulated text to the plan sink once, and sends everything after
//! that to the plan sink only. The decision is made at most once.

use serde::{Deserialize, Serialize};

use crate::detect::{Detector, MIN_DETECTION_LENGTH};

/// Name used when a plan has no recognisable title
pub const DEFAULT_PLAN_NAME: &str = "Untitled Plan";

/// Confidence the router needs before committing to plan routing.
///
/// Deliberately stricter than the classifier's own threshold.
pub const COMMIT_CONFIDENCE: f64 = 0.4;

/// Routing state for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// No decision yet; text goes to chat
    Accumulating,
    /// Finished as chat
    Chat,
    /// Committed to plan routing
    Plan,
}

/// Router tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Accumulated length (characters) before detection is attempted
    pub min_detection_length: usize,
    /// Confidence gate for committing to plan routing
    pub commit_confidence: f64,
    /// Run one last decision on completion when the stream never crossed the
    /// length threshold or never passed the gate mid-stream
    pub settle_on_complete: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_detection_length: MIN_DETECTION_LENGTH,
            commit_confidence: COMMIT_CONFIDENCE,
            settle_on_complete: true,
        }
    }
}

/// What the caller must do with routed text
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    /// Append to the chat message
    Chat(String),
    /// The response is a plan: `content` is everything accumulated so far
    PlanStart {
        content: String,
        title: Option<String>,
        confidence: f64,
    },
    /// Append to the plan
    Plan(String),
    /// The response finished as chat
    ChatComplete { content: String },
    /// The response finished as a plan
    PlanComplete { name: String, content: String },
}

/// Mutable state of one response, owned by the router
#[derive(Debug, Default)]
struct StreamState {
    accumulated_text: String,
    accumulated_chars: usize,
    decided: bool,
    routed_as_plan: bool,
}

/// State machine deciding chat vs. plan for a single response
#[derive(Debug)]
pub struct StreamRouter {
    detector: Detector,
    config: RouterConfig,
    stream: StreamState,
    finished: bool,
}

impl Default for StreamRouter {
    fn default() -> Self {
        Self::new(Detector::default(), RouterConfig::default())
    }
}

impl StreamRouter {
    /// Create a router for a new response
    pub fn new(detector: Detector, config: RouterConfig) -> Self {
        Self {
            detector,
            config,
            stream: StreamState::default(),
            finished: false,
        }
    }

    /// Current routing state
    pub fn state(&self) -> RouteState {
        match (self.stream.decided, self.stream.routed_as_plan) {
            (_, true) => RouteState::Plan,
            (true, false) => RouteState::Chat,
            (false, false) => RouteState::Accumulating,
        }
    }

    /// All answer text seen so far
    pub fn accumulated_text(&self) -> &str {
        &self.stream.accumulated_text
    }

    /// Whether `finish` has run
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Route one chunk of answer text.
    ///
    /// Returns `None` for empty chunks and for chunks arriving after `finish`.
    pub fn push(&mut self, chunk: &str) -> Option<RouteEvent> {
        if self.finished {
            tracing::debug!("Ignoring {} bytes after completion", chunk.len());
            return None;
        }
        if chunk.is_empty() {
            return None;
        }

        self.stream.accumulated_text.push_str(chunk);
        self.stream.accumulated_chars += chunk.chars().count();

        match self.state() {
            RouteState::Plan => return Some(RouteEvent::Plan(chunk.to_string())),
            RouteState::Chat => return Some(RouteEvent::Chat(chunk.to_string())),
            RouteState::Accumulating => {}
        }

        if self.stream.accumulated_chars < self.config.min_detection_length {
            return Some(RouteEvent::Chat(chunk.to_string()));
        }

        match self.try_commit() {
            Some(start) => Some(start),
            None => Some(RouteEvent::Chat(chunk.to_string())),
        }
    }

    /// Close the response.
    ///
    /// Yields the finalization exactly once; later calls return nothing. When
    /// settling on completion turns the response into a plan, a `PlanStart` is
    /// yielded before the `PlanComplete`.
    pub fn finish(&mut self) -> Vec<RouteEvent> {
        if self.finished {
            return vec![];
        }
        self.finished = true;

        let mut events = Vec::new();
        if self.state() == RouteState::Accumulating && self.config.settle_on_complete {
            events.extend(self.try_commit());
        }

        match self.state() {
            RouteState::Plan => {
                let content = self.stream.accumulated_text.clone();
                let name = self
                    .detector
                    .extract_title(&content)
                    .unwrap_or_else(|| DEFAULT_PLAN_NAME.to_string());
                events.push(RouteEvent::PlanComplete { name, content });
            }
            RouteState::Accumulating | RouteState::Chat => {
                self.stream.decided = true;
                events.push(RouteEvent::ChatComplete {
                    content: self.stream.accumulated_text.clone(),
                });
            }
        }
        events
    }

    /// Run the early indicator and, if it fires, the full classifier. Latches
    /// plan routing when the commit gate is met.
    fn try_commit(&mut self) -> Option<RouteEvent> {
        let text = &self.stream.accumulated_text;
        if !self.detector.has_early_indicator(text) {
            return None;
        }

        let result = self.detector.classify(text);
        if !result.is_plan_content || result.confidence < self.config.commit_confidence {
            tracing::debug!(
                "Plan indicator present but confidence {:.2} below gate {:.2}",
                result.confidence,
                self.config.commit_confidence
            );
            return None;
        }

        self.stream.decided = true;
        self.stream.routed_as_plan = true;
        tracing::debug!(
            "Routing response as plan (confidence {:.2}, title {:?})",
            result.confidence,
            result.plan_title
        );
        Some(RouteEvent::PlanStart {
            content: text.clone(),
            title: result.plan_title,
            confidence: result.confidence,
        })
    }
}
