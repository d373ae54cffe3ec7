//! hung - terminal chat client

mod commands;
mod config;
mod utils;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hung_ai::providers::OpenAICompatibleProvider;
use hung_chat::{
    AutoSave, AutoSaveConfig, AutoSaveHandle, CompletionOrchestrator, ConversationEvent,
    ConversationManager, FileStorage, InitOutcome, MessageId, OrchestratorConfig,
    PersistentStore, RevealConfig, RevealDriver, Role, SendOutcome, StoreOutcome,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// hung - chat with an AI assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "hung")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: deepseek/deepseek-r1:nitro)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for saved conversations and settings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Skip streaming and always use single-shot requests
    #[arg(long)]
    no_stream: bool,

    /// Typing effect pace for non-streamed replies, in milliseconds
    #[arg(long)]
    reveal_pace_ms: Option<u64>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// List saved conversations
    #[arg(long)]
    history: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Everything a session needs, assembled from config and flags
struct App {
    manager: Arc<ConversationManager>,
    orchestrator: CompletionOrchestrator,
    reveal: RevealDriver,
    autosave: AutoSaveHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never interleave with replies
    let filter = if args.verbose {
        EnvFilter::new("hung=debug,hung_chat=debug,hung_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = match args.config {
        Some(ref path) => config::Config::load_from(path),
        None => config::Config::load(),
    };

    let data_dir = args
        .data_dir
        .clone()
        .or(cfg.data_dir.clone())
        .unwrap_or_else(FileStorage::default_dir);
    let store = PersistentStore::new(Arc::new(FileStorage::open(&data_dir)?));
    tracing::debug!(dir = %data_dir.display(), "Opened storage");

    // List history and exit
    if args.history {
        println!("{}", commands::history_text(&store.history()));
        return Ok(());
    }

    let app = build_app(&args, &cfg, store);

    if let Some(command) = args.command {
        return run_command(app, &command).await;
    }

    run_interactive(app).await
}

fn build_app(args: &Args, cfg: &config::Config, store: PersistentStore) -> App {
    let manager = Arc::new(ConversationManager::new(store));
    if let InitOutcome::Restored { message_count } = manager.initialize() {
        if message_count > 0 {
            eprintln!("Restored {} messages from the last session.", message_count);
        }
    }

    // CLI takes precedence over the config file
    let mut options = cfg.completion_options();
    if let Some(ref model) = args.model {
        options.model = model.clone();
    }
    let base_url = args
        .base_url
        .clone()
        .or(cfg.base_url.clone())
        .unwrap_or_else(|| hung_ai::DEFAULT_BASE_URL.to_string());

    let provider = Arc::new(OpenAICompatibleProvider::new(base_url, cfg.api_key()));
    let defaults = OrchestratorConfig::default();
    let orchestrator = CompletionOrchestrator::new(
        Arc::clone(&manager),
        provider,
        OrchestratorConfig {
            system_prompt: cfg.system_prompt.clone().unwrap_or(defaults.system_prompt),
            options,
            stream: !args.no_stream,
            ..defaults
        },
    );

    let pace = args
        .reveal_pace_ms
        .map(Duration::from_millis)
        .or(cfg.reveal_pace())
        .unwrap_or(RevealConfig::default().pace);
    let reveal = RevealDriver::new(RevealConfig { pace });

    let autosave = AutoSave::spawn(
        Arc::clone(&manager),
        AutoSaveConfig {
            interval: cfg
                .autosave_interval()
                .unwrap_or(AutoSaveConfig::default().interval),
        },
    );

    App {
        manager,
        orchestrator,
        reveal,
        autosave,
    }
}

async fn run_command(app: App, command: &str) -> anyhow::Result<()> {
    println!("hung> {}", command);
    println!();

    let result = run_turn(&app, command).await;
    app.autosave.shutdown().await;

    // Only the user-facing text; the cause chain is in the debug log
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(app: App) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "hung ({}) - /help for commands",
            app.orchestrator.config().options.model
        );
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, &app.manager) {
            if handle_command(&app, result) {
                break;
            }
            println!();
            continue;
        }

        println!();
        if let Err(e) = run_turn(&app, input).await {
            eprintln!("Error: {}", e);
        }
        println!();
    }

    // Save-on-exit
    if app.autosave.shutdown().await.is_failed() {
        eprintln!("Warning: the conversation could not be saved to history.");
    }
    Ok(())
}

/// Apply a command result. Returns true when the session should end.
fn handle_command(app: &App, result: commands::CommandResult) -> bool {
    use commands::CommandResult;

    match result {
        CommandResult::Clear => {
            let archived = app.manager.save_to_history();
            app.manager.clear_messages();
            match archived {
                StoreOutcome::Written => println!("Saved to history and cleared."),
                StoreOutcome::Failed(_) => {
                    println!("Cleared. The conversation could not be saved to history.")
                }
                _ => println!("Cleared conversation."),
            }
        }
        CommandResult::ClearAllData => {
            if app.manager.clear_all_data().is_failed() {
                println!("Some saved data could not be removed.");
            } else {
                println!("All saved data cleared. Settings restored to defaults.");
            }
        }
        CommandResult::Load(id) => {
            if app.manager.load_conversation(&id) {
                println!("Loaded conversation {}:\n", id);
                print_transcript(&app.manager);
            } else {
                println!("No saved conversation with id {}", id);
            }
        }
        CommandResult::UpdateSettings(patch) => {
            if app.manager.update_settings(&patch).is_failed() {
                println!("Settings changed for this session, but could not be saved.");
            } else {
                println!("Settings updated.");
            }
        }
        CommandResult::Message(msg) => println!("{}", msg),
        CommandResult::Exit => return true,
        CommandResult::Unknown(cmd) => {
            println!("Unknown command: /{}", cmd);
            println!("Type /help for available commands.");
        }
    }
    false
}

fn print_transcript(manager: &ConversationManager) {
    for message in manager.messages() {
        let who = match message.role() {
            Role::User => "you",
            Role::Assistant => "hung",
            Role::System => "system",
        };
        println!("[{}] {}", who, message.content());
    }
}

/// Send one message, printing the reply as it arrives
async fn run_turn(app: &App, input: &str) -> anyhow::Result<()> {
    let mut events = app.manager.subscribe();
    let mut printer = StreamPrinter::default();

    let send = app.orchestrator.send(input);
    tokio::pin!(send);

    let mut closed = false;
    let result = loop {
        if closed {
            break send.as_mut().await;
        }
        tokio::select! {
            result = &mut send => break result,
            event = events.recv() => match event {
                Ok(event) => printer.handle(event),
                Err(RecvError::Lagged(n)) => tracing::debug!(n, "Printer lagged behind events"),
                Err(RecvError::Closed) => closed = true,
            },
        }
    };
    // Events sent just before the send finished
    while let Ok(event) = events.try_recv() {
        printer.handle(event);
    }

    match result? {
        SendOutcome::Fallback(reply) => {
            let animate = !app.manager.settings().reduce_motion;
            type_out(&app.reveal, &reply, animate).await;
        }
        SendOutcome::Streamed(_) | SendOutcome::Ignored => {}
    }
    Ok(())
}

/// Prints the streaming placeholder's growth as deltas
#[derive(Default)]
struct StreamPrinter {
    streaming: Option<MessageId>,
    printed_chars: usize,
}

impl StreamPrinter {
    fn handle(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::MessageAdded { message } if message.is_streaming() => {
                self.streaming = Some(message.id().clone());
                self.printed_chars = 0;
            }
            ConversationEvent::LastMessageUpdated { id, content }
                if self.streaming.as_ref() == Some(&id) =>
            {
                let new_text: String = content.chars().skip(self.printed_chars).collect();
                if !new_text.is_empty() {
                    self.printed_chars += new_text.chars().count();
                    print!("{}", new_text);
                    io::stdout().flush().ok();
                }
            }
            ConversationEvent::StreamingFinished { id } if self.streaming.as_ref() == Some(&id) => {
                if self.printed_chars > 0 {
                    println!();
                }
                self.streaming = None;
            }
            _ => {}
        }
    }
}

/// Print `text` through the reveal driver, one character per tick
async fn type_out(reveal: &RevealDriver, text: &str, animate: bool) {
    let mut watch = reveal.watch();
    let id = reveal.set(text, animate);
    let mut printed_chars = 0;

    loop {
        let state = watch.borrow_and_update().clone();
        if state.activation == id {
            let new_text: String = state.text.chars().skip(printed_chars).collect();
            printed_chars += new_text.chars().count();
            print!("{}", new_text);
            io::stdout().flush().ok();
            if state.complete {
                break;
            }
        }
        if watch.changed().await.is_err() {
            break;
        }
    }
    println!();
}
