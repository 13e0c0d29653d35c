//! Routes authorized commands to their executors.
//!
//! Three paths, keyed by [`CommandKind`]:
//!
//! | Kind | Path |
//! |------|------|
//! | `play_youtube` | look up a video, then open it with the platform opener |
//! | `send_whatsapp` | drive the messaging app with an automation script |
//! | everything else | `/bin/sh -c` behind the denylist |
//!
//! Every path ends in a [`DispatchReport`]: text for the transcript plus a
//! shorter spoken summary. Executor failures never escape as errors.

pub mod automation;
pub mod media;
pub mod shell;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{AutomationConfig, ShellConfig};
use crate::directive::{CommandKind, ParsedCommand, strip_directives};
use crate::llm::persona::humanize_prompt;
use crate::llm::{ChatMessage, ModelProxy};

pub use automation::WhatsappRequest;
pub use media::{MediaResolver, SearchResolver};
pub use shell::{Denylist, ShellExecutor};

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecFailure {
    /// Matched the denylist; nothing was spawned.
    #[error("refused: {0}")]
    Refused(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The executable does not exist (spawn failure or exit 127).
    #[error("command not found: {0}")]
    NotFound(String),

    /// Non-zero exit status.
    #[error("exited with code {code}")]
    Failed { code: i32 },

    /// Desktop automation was blocked by the OS accessibility settings.
    #[error("automation permission denied: {0}")]
    Permission(String),

    #[error("{0}")]
    Other(String),
}

impl ExecFailure {
    /// Friendly text for the transcript. Raw errors are capped at `raw_chars`.
    pub fn user_message(&self, raw_chars: usize) -> String {
        match self {
            Self::Refused(_) => {
                "I can't run that command. It could seriously damage your system, so it's blocked for your safety."
                    .to_owned()
            }
            Self::Timeout(_) => "That command took too long, so I stopped it.".to_owned(),
            Self::NotFound(_) => {
                "I couldn't find the program needed for that on this computer.".to_owned()
            }
            Self::Failed { .. } => "The command didn't complete successfully.".to_owned(),
            Self::Permission(_) => automation::ACCESSIBILITY_HELP.to_owned(),
            Self::Other(raw) => format!("Something went wrong: {}", truncate_chars(raw, raw_chars)),
        }
    }
}

/// Outcome of one execution. Built by executors, never an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub success: bool,
    /// Captured output (stdout, then stderr), possibly truncated.
    pub output: String,
    pub error: Option<ExecFailure>,
}

impl ExecResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(failure: ExecFailure) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(failure),
        }
    }

    /// Failure that still carries captured output.
    pub fn failed_with_output(failure: ExecFailure, output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(failure),
        }
    }

    fn failure(&self) -> ExecFailure {
        self.error
            .clone()
            .unwrap_or_else(|| ExecFailure::Other("unknown error".into()))
    }
}

/// Side-effecting execution boundary.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a shell command line. Implementations enforce the denylist.
    async fn run_shell(&self, command: &str, kind: CommandKind) -> ExecResult;

    /// Run a desktop automation script.
    async fn run_script(&self, script: &str) -> ExecResult;

    /// Open a link we built ourselves with the platform opener. The link may
    /// embed user text, so the command denylist does not apply here.
    async fn open_url(&self, url: &str) -> ExecResult;
}

/// What the user sees and hears after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub success: bool,
    pub display: String,
    pub spoken: String,
}

impl DispatchReport {
    fn ok(display: impl Into<String>, spoken: impl Into<String>) -> Self {
        Self {
            success: true,
            display: display.into(),
            spoken: spoken.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            spoken: message.clone(),
            display: message,
        }
    }
}

/// Routes approved commands and normalizes their outcomes.
pub struct Dispatcher {
    executor: Arc<dyn CommandExecutor>,
    proxy: Arc<dyn ModelProxy>,
    media: Arc<dyn MediaResolver>,
    shell: ShellConfig,
    automation: AutomationConfig,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        proxy: Arc<dyn ModelProxy>,
        media: Arc<dyn MediaResolver>,
        shell: ShellConfig,
        automation: AutomationConfig,
    ) -> Self {
        Self {
            executor,
            proxy,
            media,
            shell,
            automation,
        }
    }

    /// Execute an approved command.
    pub async fn dispatch(&self, cmd: &ParsedCommand) -> DispatchReport {
        if cmd.command.trim().is_empty() {
            warn!(kind = %cmd.kind, "rejected command with empty text");
            return DispatchReport::failed("I couldn't process that: the command is empty.");
        }

        info!(kind = %cmd.kind, risk = %cmd.risk, "dispatching command");
        debug!(command = %cmd.command, "command text");

        match cmd.kind {
            CommandKind::PlayYoutube => self.play_media(cmd).await,
            CommandKind::SendWhatsapp => self.send_message(cmd).await,
            CommandKind::OpenApp
            | CommandKind::FileOp
            | CommandKind::Terminal
            | CommandKind::SystemInfo => self.run_shell(cmd).await,
        }
    }

    async fn run_shell(&self, cmd: &ParsedCommand) -> DispatchReport {
        let result = self.executor.run_shell(&cmd.command, cmd.kind).await;
        if !result.success {
            let failure = result.failure();
            warn!(kind = %cmd.kind, error = %failure, "command failed");
            return DispatchReport::failed(failure.user_message(self.shell.error_chars));
        }

        let output = truncate_chars(result.output.trim(), self.shell.display_chars);
        if output.is_empty() {
            let done = format!("Done! {}.", cmd.description.trim_end_matches('.'));
            return DispatchReport::ok(done.clone(), done);
        }

        if cmd.kind == CommandKind::SystemInfo {
            return self.humanize(cmd, &output).await;
        }

        DispatchReport::ok(
            fenced(&cmd.description, &output),
            truncate_chars(&output, self.shell.speak_chars),
        )
    }

    async fn humanize(&self, cmd: &ParsedCommand, output: &str) -> DispatchReport {
        let prompt = [ChatMessage::user(humanize_prompt(&cmd.description, output))];
        match self.proxy.complete(&prompt).await {
            Ok(reply) => {
                let text = strip_directives(&reply);
                if text.is_empty() {
                    self.raw_info(cmd, output)
                } else {
                    DispatchReport::ok(text.clone(), text)
                }
            }
            Err(e) => {
                warn!(code = e.code(), "could not rephrase system output");
                self.raw_info(cmd, output)
            }
        }
    }

    fn raw_info(&self, cmd: &ParsedCommand, output: &str) -> DispatchReport {
        DispatchReport::ok(
            fenced(&cmd.description, output),
            truncate_chars(output, self.shell.info_speak_chars),
        )
    }

    async fn play_media(&self, cmd: &ParsedCommand) -> DispatchReport {
        const FAILED: &str = "Sorry, I couldn't play that video right now.";
        let query = cmd.command.trim();

        let url = match self.media.resolve(query).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "video lookup failed");
                return DispatchReport::failed(FAILED);
            }
        };

        let result = self.executor.open_url(&url).await;
        if result.success {
            let text = format!("Playing \"{query}\" on YouTube.");
            DispatchReport::ok(text.clone(), text)
        } else {
            warn!(error = %result.failure(), "could not open video link");
            DispatchReport::failed(FAILED)
        }
    }

    async fn send_message(&self, cmd: &ParsedCommand) -> DispatchReport {
        let Some(request) = WhatsappRequest::parse(&cmd.command) else {
            return DispatchReport::failed("I couldn't process that: no contact was given.");
        };

        let script = automation::build_script(&self.automation.messaging_app, &request);
        let result = self.executor.run_script(&script).await;
        if result.success {
            let text = match request.message {
                Some(_) => format!("Message sent to {}.", request.contact),
                None => format!("Opened your chat with {}.", request.contact),
            };
            return DispatchReport::ok(text.clone(), text);
        }

        let failure = automation::classify_failure(&result);
        warn!(error = %failure, "messaging automation failed");
        match failure {
            ExecFailure::Permission(_) => {
                DispatchReport::failed(failure.user_message(self.shell.error_chars))
            }
            other => DispatchReport::failed(format!(
                "I couldn't send that message. {}",
                other.user_message(self.shell.error_chars)
            )),
        }
    }
}

/// Cap `s` at `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_owned(),
        Some((end, _)) => format!("{}…", &s[..end]),
    }
}

fn fenced(description: &str, output: &str) -> String {
    format!("{description}:\n```\n{output}\n```")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::Mutex;

    use super::*;
    use crate::llm::ProxyError;

    #[derive(Default)]
    struct FakeExecutor {
        shell: Mutex<Vec<String>>,
        scripts: Mutex<Vec<String>>,
        opened: Mutex<Vec<String>>,
        reply: Mutex<Option<ExecResult>>,
    }

    impl FakeExecutor {
        fn replying(result: ExecResult) -> Self {
            Self {
                reply: Mutex::new(Some(result)),
                ..Default::default()
            }
        }

        fn next(&self) -> ExecResult {
            self.reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| ExecResult::ok(""))
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn run_shell(&self, command: &str, _kind: CommandKind) -> ExecResult {
            self.shell.lock().unwrap().push(command.to_owned());
            self.next()
        }

        async fn run_script(&self, script: &str) -> ExecResult {
            self.scripts.lock().unwrap().push(script.to_owned());
            self.next()
        }

        async fn open_url(&self, url: &str) -> ExecResult {
            self.opened.lock().unwrap().push(url.to_owned());
            self.next()
        }
    }

    struct FakeProxy(Result<String, ProxyError>);

    #[async_trait]
    impl ModelProxy for FakeProxy {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProxyError> {
            self.0.clone()
        }
    }

    struct FakeMedia(Option<&'static str>);

    #[async_trait]
    impl MediaResolver for FakeMedia {
        async fn resolve(&self, _query: &str) -> Result<String, laila_search::SearchError> {
            self.0
                .map(str::to_owned)
                .ok_or_else(|| laila_search::SearchError::Http("offline".into()))
        }
    }

    fn dispatcher(exec: Arc<FakeExecutor>, proxy: FakeProxy) -> Dispatcher {
        Dispatcher::new(
            exec,
            Arc::new(proxy),
            Arc::new(FakeMedia(Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))),
            ShellConfig::default(),
            AutomationConfig::default(),
        )
    }

    fn cmd(kind: CommandKind, text: &str, description: &str) -> ParsedCommand {
        ParsedCommand::new(kind, text, description)
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("héllo wörld", 4), "héll…");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[tokio::test]
    async fn empty_output_reports_done() {
        let exec = Arc::new(FakeExecutor::default());
        let report = dispatcher(exec.clone(), FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::OpenApp, "open -a Calculator", "Open Calculator"))
            .await;
        assert!(report.success);
        assert_eq!(report.display, "Done! Open Calculator.");
        assert_eq!(exec.shell.lock().unwrap().as_slice(), ["open -a Calculator"]);
    }

    #[tokio::test]
    async fn terminal_output_is_fenced_and_spoken_short() {
        let long = "x".repeat(400);
        let exec = Arc::new(FakeExecutor::replying(ExecResult::ok(format!("  {long}\n"))));
        let report = dispatcher(exec, FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::Terminal, "yes x | head", "Print x"))
            .await;
        assert!(report.display.starts_with("Print x:\n```\n"));
        assert!(report.display.contains(&long));
        assert_eq!(report.spoken.chars().count(), 151);
    }

    #[tokio::test]
    async fn display_is_capped() {
        let exec = Arc::new(FakeExecutor::replying(ExecResult::ok("y".repeat(5000))));
        let report = dispatcher(exec, FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::Terminal, "yes", "Spam"))
            .await;
        assert!(report.display.chars().count() < 2100);
    }

    #[tokio::test]
    async fn system_info_is_rephrased_by_model() {
        let exec = Arc::new(FakeExecutor::replying(ExecResult::ok("87%; charging")));
        let report = dispatcher(
            exec,
            FakeProxy(Ok("Your battery is at 87 percent and charging.".into())),
        )
        .dispatch(&cmd(CommandKind::SystemInfo, "pmset -g batt", "Check battery"))
        .await;
        assert_eq!(report.display, "Your battery is at 87 percent and charging.");
        assert_eq!(report.spoken, report.display);
    }

    #[tokio::test]
    async fn system_info_falls_back_to_raw_output() {
        let raw = "z".repeat(300);
        let exec = Arc::new(FakeExecutor::replying(ExecResult::ok(raw.clone())));
        let report = dispatcher(exec, FakeProxy(Err(ProxyError::Network("down".into()))))
            .dispatch(&cmd(CommandKind::SystemInfo, "uptime", "Check uptime"))
            .await;
        assert!(report.success);
        assert!(report.display.contains("```"));
        assert_eq!(report.spoken.chars().count(), 201);
    }

    #[tokio::test]
    async fn failures_map_to_distinct_messages() {
        let cases = [
            ExecFailure::Timeout(15),
            ExecFailure::NotFound("nope".into()),
            ExecFailure::Failed { code: 1 },
            ExecFailure::Refused("recursive delete of /".into()),
        ];
        let mut seen = Vec::new();
        for failure in cases {
            let exec = Arc::new(FakeExecutor::replying(ExecResult::failed(failure)));
            let report = dispatcher(exec, FakeProxy(Ok(String::new())))
                .dispatch(&cmd(CommandKind::Terminal, "whatever", "Whatever"))
                .await;
            assert!(!report.success);
            seen.push(report.display);
        }
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn raw_errors_are_capped() {
        let raw = "e".repeat(1000);
        let exec = Arc::new(FakeExecutor::replying(ExecResult::failed(ExecFailure::Other(raw))));
        let report = dispatcher(exec, FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::Terminal, "x", "X"))
            .await;
        assert!(report.display.chars().count() < 350);
    }

    #[tokio::test]
    async fn empty_command_never_reaches_executor() {
        let exec = Arc::new(FakeExecutor::default());
        let report = dispatcher(exec.clone(), FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::Terminal, "   ", "Nothing"))
            .await;
        assert!(!report.success);
        assert!(exec.shell.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn play_youtube_opens_resolved_url() {
        let exec = Arc::new(FakeExecutor::default());
        let report = dispatcher(exec.clone(), FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::PlayYoutube, "rick astley", "Play Rick"))
            .await;
        assert!(report.success);
        assert!(exec.shell.lock().unwrap().is_empty());
        assert_eq!(
            exec.opened.lock().unwrap().as_slice(),
            ["https://www.youtube.com/watch?v=dQw4w9WgXcQ"]
        );
    }

    #[tokio::test]
    async fn play_youtube_results_link_with_power_words_still_opens() {
        let link = "https://www.youtube.com/results?search_query=reboot+lofi+mix";
        let exec = Arc::new(FakeExecutor::default());
        let d = Dispatcher::new(
            exec.clone(),
            Arc::new(FakeProxy(Ok(String::new()))),
            Arc::new(FakeMedia(Some(link))),
            ShellConfig::default(),
            AutomationConfig::default(),
        );
        let report = d
            .dispatch(&cmd(CommandKind::PlayYoutube, "reboot lofi mix", "Play a mix"))
            .await;
        assert!(report.success, "{}", report.display);
        assert_eq!(report.display, "Playing \"reboot lofi mix\" on YouTube.");
        assert_eq!(exec.opened.lock().unwrap().as_slice(), [link]);
        assert!(exec.shell.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn play_youtube_lookup_failure_is_generic() {
        let exec = Arc::new(FakeExecutor::default());
        let d = Dispatcher::new(
            exec.clone(),
            Arc::new(FakeProxy(Ok(String::new()))),
            Arc::new(FakeMedia(None)),
            ShellConfig::default(),
            AutomationConfig::default(),
        );
        let report = d.dispatch(&cmd(CommandKind::PlayYoutube, "anything", "Play")).await;
        assert!(!report.success);
        assert!(report.display.contains("couldn't play"));
        assert!(exec.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whatsapp_runs_script_and_confirms() {
        let exec = Arc::new(FakeExecutor::default());
        let report = dispatcher(exec.clone(), FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::SendWhatsapp, "Mom: on my way", "Text Mom"))
            .await;
        assert!(report.success);
        assert_eq!(report.display, "Message sent to Mom.");
        let scripts = exec.scripts.lock().unwrap();
        assert!(scripts[0].contains("\"on my way\""));
    }

    #[tokio::test]
    async fn whatsapp_accessibility_denial_gives_instructions() {
        let exec = Arc::new(FakeExecutor::replying(ExecResult::failed_with_output(
            ExecFailure::Failed { code: 1 },
            "execution error: System Events got an error: osascript is not allowed assistive access. (-1719)",
        )));
        let report = dispatcher(exec, FakeProxy(Ok(String::new())))
            .dispatch(&cmd(CommandKind::SendWhatsapp, "Mom: hi", "Text Mom"))
            .await;
        assert!(!report.success);
        assert!(report.display.contains("Accessibility"));
    }
}
