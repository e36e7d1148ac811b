//! Slash commands for interactive mode

use quire_chat::{ChatSession, Role};

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command. Returns `None` for ordinary input.
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;
    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),
        "clear" | "c" => CommandResult::Clear,
        "quit" | "exit" | "q" => CommandResult::Exit,
        "status" | "s" => CommandResult::Message(status_message(session)),
        _ => CommandResult::Unknown(command),
    })
}

fn status_message(session: &ChatSession) -> String {
    let messages = session.conversation().messages();
    let responses = messages.iter().filter(|m| m.role == Role::Assistant).count();
    let plans = messages.iter().filter(|m| m.routed_to_plan).count();
    format!(
        "Session: {}\nProject: {}\nResponses: {} ({} routed to plans)\nStatus: {:?}",
        session.session_id().unwrap_or("(new)"),
        session.config().project_path.display(),
        responses,
        plans,
        session.conversation().status()
    )
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /status, /s          Show session id, project and plan count
  /clear, /c           Clear conversation history and start a new CLI session
  /quit, /exit, /q     Exit quire"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_chat::{CliTransport, FsPlanStore, SessionConfig};
    use std::sync::Arc;

    fn session() -> ChatSession {
        ChatSession::new(
            SessionConfig::default(),
            Arc::new(CliTransport::new(Default::default())),
            Arc::new(FsPlanStore::default()),
        )
    }

    #[test]
    fn test_plain_input_is_not_a_command() {
        assert_eq!(execute_command("hello there", &session()), None);
    }

    #[test]
    fn test_commands() {
        let session = session();
        assert_eq!(execute_command("/clear", &session), Some(CommandResult::Clear));
        assert_eq!(execute_command("  /Q ", &session), Some(CommandResult::Exit));
        assert_eq!(
            execute_command("/frobnicate now", &session),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
        match execute_command("/status", &session) {
            Some(CommandResult::Message(text)) => {
                assert!(text.contains("Session: (new)"));
                assert!(text.contains("Responses: 0 (0 routed to plans)"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
