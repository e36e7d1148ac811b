//! quire - plan-aware chat front end for a local CLI assistant

mod commands;
mod config;
mod utils;

use clap::Parser;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quire_ai::providers::CliOptions;
use quire_chat::{
    ChatSession, CliTransport, FsPlanStore, SessionConfig, SessionEvent, SessionHandle,
    TurnOutcome,
};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

/// quire - chat with a local CLI assistant, with plans routed to files
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    prompt: Option<String>,

    /// Project directory the assistant works in and plans are written under
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Assistant CLI program (default: claude)
    #[arg(long)]
    cli: Option<String>,

    /// Model passed to the assistant CLI
    #[arg(short, long)]
    model: Option<String>,

    /// Classify a file as plan or chat and exit
    #[arg(long, value_name = "FILE")]
    classify: Option<PathBuf>,

    /// Check that the assistant CLI is available and exit
    #[arg(long)]
    check: bool,

    /// Print session events as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.init_config {
        let path = config::Config::init()?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    // Merge config with CLI args (CLI takes precedence)
    let mut cfg = config::Config::load();
    if let Some(cli) = args.cli {
        cfg.cli_path = cli;
    }
    if let Some(model) = args.model {
        cfg.model = Some(model);
    }
    if let Some(project) = &args.project {
        cfg.project_path = Some(project.display().to_string());
    }

    if args.show_config {
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    if let Some(path) = &args.classify {
        return classify_file(path, &cfg, args.json);
    }

    if args.check {
        return check_cli(&cfg.cli_path).await;
    }

    let project_path = match &cfg.project_path {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let transport = Arc::new(CliTransport::new(CliOptions {
        program: cfg.cli_path.clone(),
        model: cfg.model.clone(),
        ..Default::default()
    }));
    let store = Arc::new(FsPlanStore::new(&cfg.plans_dir));
    let session_config = SessionConfig {
        project_path,
        router: cfg.router_config(),
        detector: cfg.detector(),
    };
    let mut session = ChatSession::new(session_config, transport, store);

    spawn_interrupt_handler(&session);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(session.subscribe(), args.json, done_tx));

    let result = match args.prompt {
        Some(prompt) => run_prompt(&mut session, &prompt, &mut done_rx).await,
        None => run_interactive(&mut session, &mut done_rx).await,
    };

    session.flush_plan_writes().await;
    drop(session);
    let _ = printer.await;
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("quire=debug,quire_ai=debug,quire_chat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// How long a cancelled response may take to wind down after Ctrl-C
const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// First Ctrl-C cancels the running response; a second one while idle exits.
fn spawn_interrupt_handler(session: &ChatSession) {
    let handle = session.handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle.is_running() {
                std::process::exit(130);
            }
            if !interrupt(&handle, INTERRUPT_GRACE).await {
                tracing::warn!(
                    "Response still running {:?} after cancel, exiting",
                    INTERRUPT_GRACE
                );
                std::process::exit(130);
            }
        }
    });
}

/// Cancel the running response and wait for the session to go idle.
/// Returns `false` if it is still running after `grace`.
async fn interrupt(handle: &SessionHandle, grace: Duration) -> bool {
    handle.abort();
    handle.wait_for_idle_timeout(grace).await
}

fn classify_file(path: &Path, cfg: &config::Config, json: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let result = cfg.detector().classify(&content);
    let router = cfg.router_config();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let routed = result.is_plan_content && result.confidence >= router.commit_confidence;
    println!("plan content: {}", if result.is_plan_content { "yes" } else { "no" });
    println!("confidence:   {:.2}", result.confidence);
    println!(
        "routed:       {}",
        if routed { "plan" } else { "chat" }
    );
    if let Some(title) = &result.plan_title {
        println!("title:        {}", title);
    }
    if result.plan_start_index >= 0 {
        println!("starts at:    char {}", result.plan_start_index);
    }
    Ok(())
}

async fn check_cli(program: &str) -> anyhow::Result<()> {
    let status = quire_ai::probe::probe(program).await;
    if status.available {
        println!(
            "{}: {}",
            program,
            status.version.as_deref().unwrap_or("available")
        );
        return Ok(());
    }
    anyhow::bail!(
        "{} is not available: {}",
        program,
        status.diagnostic.as_deref().unwrap_or("unknown reason")
    )
}

async fn run_prompt(
    session: &mut ChatSession,
    prompt: &str,
    done: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let result = session.send(prompt).await;
    wait_for_printer(done).await;
    match result {
        Ok(outcome) => {
            report_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            if e.is_unavailable() {
                eprintln!("Install the assistant CLI or set `cli_path` (quire --init-config).");
            }
            Err(e.into())
        }
    }
}

async fn run_interactive(
    session: &mut ChatSession,
    done: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "quire ({}) project: {}",
            env!("CARGO_PKG_VERSION"),
            session.config().project_path.display()
        );
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, session) {
            match result {
                commands::CommandResult::Clear => {
                    session.clear();
                    println!("Cleared conversation.");
                }
                commands::CommandResult::Exit => break,
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        let result = session.send(input).await;
        wait_for_printer(done).await;
        match result {
            Ok(outcome) => report_outcome(&outcome),
            Err(e) if e.is_unavailable() => return Err(e.into()),
            // already reported through the event stream
            Err(e) => tracing::debug!("Response failed: {}", e),
        }
        println!();
    }

    Ok(())
}

fn report_outcome(outcome: &TurnOutcome) {
    if let TurnOutcome::Plan { name, content, .. } = outcome {
        println!("[Plan \"{}\": {} characters]", name, content.chars().count());
    }
}

/// Wait until the printer has shown the end of the response
async fn wait_for_printer(done: &mut mpsc::UnboundedReceiver<()>) {
    let _ = tokio::time::timeout(Duration::from_secs(1), done.recv()).await;
}

async fn print_events(
    mut events: broadcast::Receiver<SessionEvent>,
    json: bool,
    done: mpsc::UnboundedSender<()>,
) {
    let mut tool_names: HashMap<String, String> = HashMap::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event printer lagged, skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let terminal = event.is_terminal();

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        } else {
            print_event(event, &mut tool_names);
        }
        let _ = std::io::stdout().flush();

        if terminal {
            let _ = done.send(());
        }
    }
}

fn print_event(event: SessionEvent, tool_names: &mut HashMap<String, String>) {
    match event {
        SessionEvent::TextDelta { delta, .. } => print!("{}", delta),
        SessionEvent::ToolStart {
            tool_call_id, name, ..
        } => {
            println!("\n[Running {}...]", name);
            tool_names.insert(tool_call_id, name);
        }
        SessionEvent::ToolEnd {
            tool_call_id,
            result,
            is_error,
        } => {
            let name = tool_names
                .remove(&tool_call_id)
                .unwrap_or_else(|| "tool".to_string());
            if is_error {
                println!("[{} failed: {}]", name, utils::one_line(&result, 200));
            } else {
                println!("[{}: {}]", name, utils::one_line(&result, 200));
            }
        }
        SessionEvent::PlanDetected {
            name, confidence, ..
        } => {
            println!(
                "\n[Plan detected: {} ({:.0}% confidence), moving it to the plan editor]",
                name,
                confidence * 100.0
            );
        }
        SessionEvent::PlanComplete { name, .. } => println!("[Plan complete: {}]", name),
        SessionEvent::PlanFileCreated { file_name, .. } => {
            println!("[Plan saved as {}]", file_name)
        }
        SessionEvent::PlanFileFailed { name, message } => {
            eprintln!("[Could not save plan {}: {}]", name, message)
        }
        SessionEvent::MessageComplete { .. } => println!(),
        SessionEvent::Cancelled { .. } => println!("\n[Cancelled]"),
        SessionEvent::Error { message } => eprintln!("\nError: {}", message),
        SessionEvent::ResponseStart { .. }
        | SessionEvent::ReasoningDelta { .. }
        | SessionEvent::PlanDelta { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quire_ai::{ChatRequest, ChunkStream};
    use quire_chat::Transport;
    use tokio_util::sync::CancellationToken;

    /// Opens a response that never produces anything
    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn stream(
            &self,
            _request: ChatRequest,
            _cancel: CancellationToken,
        ) -> quire_ai::Result<ChunkStream> {
            Ok(Box::pin(futures::stream::pending::<quire_ai::StreamChunk>()))
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_response() {
        let mut session = ChatSession::new(
            SessionConfig::default(),
            Arc::new(Stalled),
            Arc::new(FsPlanStore::default()),
        );
        let handle = session.handle();
        assert!(interrupt(&handle, Duration::from_millis(10)).await);

        let interrupter = tokio::spawn(async move {
            while !handle.is_running() {
                tokio::task::yield_now().await;
            }
            interrupt(&handle, Duration::from_secs(5)).await
        });

        let outcome = session.send("go").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Cancelled));
        assert!(interrupter.await.unwrap());
        assert!(!session.is_running());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["quire", "-c", "hello", "-p", "/tmp/project", "--cli", "my-claude"]);
        assert_eq!(args.prompt.as_deref(), Some("hello"));
        assert_eq!(args.project, Some(PathBuf::from("/tmp/project")));
        assert_eq!(args.cli.as_deref(), Some("my-claude"));
        assert!(!args.check);
    }

    #[test]
    fn test_args_classify() {
        let args = Args::parse_from(["quire", "--classify", "notes.md", "--json"]);
        assert_eq!(args.classify, Some(PathBuf::from("notes.md")));
        assert!(args.json);
    }
}
