//! CLI binary for laila.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use laila::authorization::{Decision, PromptView};
use laila::voice::{
    ListenerEvent, RecognitionError, RecognitionEvent, RecognitionStream, SpeechInput,
    WakeWordListener,
};
use laila::{Assistant, AssistantConfig, Reply};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Laila: a personal assistant that can act on your computer.
#[derive(Parser)]
#[command(name = "laila", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal.
    Chat {
        /// Continue this session instead of the active one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Drive the wake-word listener with typed transcripts.
    Voice,
    /// Show the to-do list.
    Tasks,
    /// Inspect or reset standing command approvals.
    Permissions {
        #[command(subcommand)]
        action: Option<PermissionsAction>,
    },
    /// Inspect or clear chat sessions.
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsAction>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum PermissionsAction {
    /// Show command kinds that run without asking.
    List,
    /// Ask again for everything.
    Reset,
}

#[derive(Subcommand, Clone, Copy)]
enum SessionsAction {
    /// Show saved chats, newest first.
    List,
    /// Delete every chat.
    Clear,
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("laila=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => AssistantConfig::from_file(path)?,
        None => AssistantConfig::load_or_default(&AssistantConfig::default_config_path())?,
    };

    match cli.command.unwrap_or(Command::Chat { session: None }) {
        Command::Chat { session } => run_chat(&config, session).await,
        Command::Voice => run_voice(&config).await,
        Command::Tasks => show_tasks(&config),
        Command::Permissions { action } => {
            permissions(&config, action.unwrap_or(PermissionsAction::List))
        }
        Command::Sessions { action } => {
            sessions(&config, action.unwrap_or(SessionsAction::List)).await
        }
    }
}

async fn run_chat(config: &AssistantConfig, session: Option<String>) -> anyhow::Result<()> {
    println!("Laila v{}", env!("CARGO_PKG_VERSION"));
    println!("Type a message, /new for a fresh chat, /quit to exit.\n");

    let assistant = Assistant::from_config(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session = session;

    loop {
        let Some(line) = read_line(&mut lines, "you> ").await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                let fresh = assistant.new_session().await?;
                session = Some(fresh.id);
                println!("(new chat)\n");
                continue;
            }
            _ => {}
        }

        match assistant.send(session.as_deref(), &line).await {
            Ok(reply) => {
                session = Some(reply.session_id.clone());
                print_reply(&reply);
                if let Some(prompt) = reply.prompt {
                    consent_loop(&assistant, prompt, &mut lines).await?;
                }
            }
            Err(e) => println!("laila> {}\n", e.user_message()),
        }
    }
    Ok(())
}

/// Walk the user through an open consent prompt.
async fn consent_loop(
    assistant: &Assistant,
    mut prompt: PromptView,
    lines: &mut StdinLines,
) -> anyhow::Result<()> {
    loop {
        println!("[step {}] {}", prompt.step, prompt.message);
        if let Some(error) = &prompt.error {
            println!("  ! {error}");
        }

        let reply = if prompt.needs_secret {
            let Some(secret) = read_line(lines, "password (or /cancel)> ").await? else {
                return Ok(());
            };
            if secret.trim() == "/cancel" {
                assistant.decide(Decision::Cancel).await?
            } else {
                assistant.submit_secret(secret.trim()).await?
            }
        } else {
            for (i, choice) in prompt.choices.iter().enumerate() {
                println!("  {}) {}", i + 1, choice.label());
            }
            let Some(pick) = read_line(lines, "choice> ").await? else {
                return Ok(());
            };
            let Some(decision) = pick
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| prompt.choices.get(i).copied())
            else {
                println!("  Pick a number from the list.");
                continue;
            };
            assistant.decide(decision).await?
        };

        print_reply(&reply);
        match reply.prompt {
            Some(next) => prompt = next,
            None => return Ok(()),
        }
    }
}

async fn read_line(lines: &mut StdinLines, prompt: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

fn print_reply(reply: &Reply) {
    let text = reply.text();
    if !text.is_empty() {
        println!("laila> {text}\n");
    }
    if reply.show_tasks {
        println!("(task panel requested)\n");
    }
}

/// Recogniser fed from typed lines. Each line is a final result at full
/// confidence; lines typed while no session is open are dropped.
#[derive(Default, Clone)]
struct TypedInput {
    current: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

impl TypedInput {
    fn hear(&self, transcript: String) -> bool {
        let guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx
                .send(RecognitionEvent::Result {
                    transcript,
                    confidence: 1.0,
                    is_final: true,
                })
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl SpeechInput for TypedInput {
    async fn start(&self) -> Result<RecognitionStream, RecognitionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

async fn run_voice(config: &AssistantConfig) -> anyhow::Result<()> {
    println!("Laila v{} voice mode", env!("CARGO_PKG_VERSION"));
    println!("Type what the microphone would hear, e.g. \"hey laila what time is it\".\n");

    let input = TypedInput::default();
    let assistant = Assistant::from_config(config)?;
    let speech = Arc::new(laila::voice::NullSpeechOutput);
    let (listener, mut events) = WakeWordListener::new(input.clone(), speech, &config.voice);
    let assistant = assistant.with_voice(Arc::new(listener.clone()));

    if !listener.start() {
        anyhow::bail!("speech recognition is not available");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ListenerEvent::Listening(on) => info!(listening = on, "listener state"),
                    ListenerEvent::Unsupported => break,
                    ListenerEvent::Wake(trailing) => {
                        match assistant.handle_wake(&trailing).await {
                            Ok(reply) => print_reply(&reply),
                            Err(e) => println!("laila> {}\n", e.user_message()),
                        }
                        if let Some(prompt) = assistant.pending_prompt() {
                            // Consent is answered on the keyboard; nothing may
                            // be heard as a new wake meanwhile.
                            listener.pause();
                            let answered = consent_loop(&assistant, prompt, &mut lines).await;
                            listener.resume();
                            answered?;
                        }
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !input.hear(line) {
                    println!("(not listening right now)");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    listener.stop();
    Ok(())
}

fn show_tasks(config: &AssistantConfig) -> anyhow::Result<()> {
    let store = laila::storage::StateStore::open(config.storage.state_file());
    let tasks = &store.state().tasks;
    println!("{}", tasks.summary());
    for task in tasks.iter().filter(|t| t.completed) {
        println!("- [done] {}", task.title);
    }
    Ok(())
}

fn permissions(config: &AssistantConfig, action: PermissionsAction) -> anyhow::Result<()> {
    let mut store = laila::storage::StateStore::open(config.storage.state_file());
    match action {
        PermissionsAction::List => {
            let granted = store.state().permissions.all_granted();
            if granted.is_empty() {
                println!("No standing approvals.");
            }
            for kind in granted {
                println!("- {kind} ({})", kind.label());
            }
        }
        PermissionsAction::Reset => {
            store.set_permissions(Default::default())?;
            println!("All standing approvals removed.");
        }
    }
    Ok(())
}

async fn sessions(config: &AssistantConfig, action: SessionsAction) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config)?;
    match action {
        SessionsAction::List => {
            let active = assistant.local_state().active_session;
            for s in assistant.sessions().await? {
                let marker = if active.as_deref() == Some(s.id.as_str()) { "*" } else { " " };
                println!(
                    "{marker} {}  {}  ({} messages, {})",
                    s.id,
                    s.title,
                    s.messages.len(),
                    s.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        SessionsAction::Clear => {
            assistant.clear_sessions().await?;
            println!("All chats deleted.");
        }
    }
    Ok(())
}
