//! Error types for quire-ai

use thiserror::Error;

/// Result type alias using quire-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the assistant CLI
#[derive(Error, Debug)]
pub enum Error {
    /// The CLI binary could not be found or did not answer the probe
    #[error("Assistant CLI unavailable: {0}")]
    CliUnavailable(String),

    /// The CLI process could not be started
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },
}

impl Error {
    /// Create a spawn error for a program
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the CLI itself is missing
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::CliUnavailable(_) => true,
            Error::Spawn { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("not found") || msg.contains("no such file")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_from_spawn() {
        let e = Error::spawn("claude", "No such file or directory (os error 2)");
        assert!(e.is_unavailable());
        assert!(Error::CliUnavailable("missing".into()).is_unavailable());
        assert!(!Error::spawn("claude", "permission denied").is_unavailable());
    }

    #[test]
    fn test_spawn_display() {
        let e = Error::spawn("claude", "boom");
        assert_eq!(e.to_string(), "Failed to spawn claude: boom");
    }
}
