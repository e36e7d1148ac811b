//! quire-chat: plan-aware chat core
//!
//! This crate decides, while an assistant response is still streaming,
//! whether it is ordinary chat or a plan document, and keeps the
//! conversation state the chat surface renders.

pub mod conversation;
pub mod detect;
pub mod error;
pub mod events;
pub mod handle;
pub mod patterns;
pub mod plans;
pub mod router;
pub mod session;
pub mod transport;

pub use conversation::{ChatMessage, Conversation, ReasoningBlock, Role, Status, ToolInvocation, ToolStatus};
pub use detect::{DetectionResult, Detector};
pub use error::Error;
pub use events::SessionEvent;
pub use handle::SessionHandle;
pub use patterns::PatternSet;
pub use plans::{FsPlanStore, PlanStore, extract_name_from_content, generate_file_name};
pub use router::{RouteEvent, RouteState, RouterConfig, StreamRouter};
pub use session::{ChatSession, SessionConfig, TurnOutcome};
pub use transport::{CliTransport, Transport};
