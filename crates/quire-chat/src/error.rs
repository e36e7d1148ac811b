//! Error types for quire-chat

use thiserror::Error;

/// Result type alias using quire-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the streaming layer
    #[error(transparent)]
    Ai(#[from] quire_ai::Error),

    /// The transport reported a failure mid-stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response is already streaming in this session
    #[error("A response is already in progress")]
    Busy,

    /// Writing a plan file failed
    #[error("Plan store error: {0}")]
    PlanStore(String),

    /// A detection pattern did not compile
    #[error("Invalid pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    /// A generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if the failure came from the assistant side of the stream
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Ai(_))
    }

    /// Check if the assistant CLI is missing
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::PlanStore(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::Transport("boom".into()).is_transport());
        assert!(Error::Ai(quire_ai::Error::spawn("claude", "broken pipe")).is_transport());
        assert!(!Error::Busy.is_transport());
        assert!(!Error::PlanStore("disk full".into()).is_transport());
    }

    #[test]
    fn test_unavailable_passthrough() {
        let e = Error::from(quire_ai::Error::CliUnavailable("claude".into()));
        assert!(e.is_unavailable());
        assert_eq!(e.to_string(), "Assistant CLI unavailable: claude");
        assert!(!Error::Busy.is_unavailable());
    }

    #[test]
    fn test_io_maps_to_plan_store() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(e, Error::PlanStore(_)));
    }
}
