//! Inline directive grammar for model replies.
//!
//! The model may embed two kinds of bracketed tags anywhere in its
//! natural-language reply:
//!
//! | Tag | Shape |
//! |-----|-------|
//! | Command | `[COMMAND: <type> \| <command-text> \| <description>]` |
//! | Task | `[TASK: <action> \| <title>? \| <priority>? \| <dueDate>?]` |
//!
//! Each tag kind has its own grammar case. Only the first command tag and the
//! first task tag are honoured; [`strip_directives`] removes every occurrence
//! of both shapes to produce the user-visible text. Nothing here fails:
//! malformed brackets simply stay in the text as prose.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::risk::{RiskLevel, classify};

static COMMAND_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[COMMAND:\s*(?i:(open_app|file_op|terminal|system_info|play_youtube|send_whatsapp))\s*\|\s*(.+?)\s*\|\s*(.+?)\s*\]",
    )
    .unwrap_or_else(|e| unreachable!("command tag pattern is valid: {e}"))
});

static TASK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[TASK:\s*(?i:(add|complete|delete|list))\s*((?:\|[^\]]*)?)\]")
        .unwrap_or_else(|e| unreachable!("task tag pattern is valid: {e}"))
});

/// Kind of local action a command tag asks for.
///
/// The kind selects the executor and the permission bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Launch a desktop application.
    OpenApp,
    /// File manipulation through the shell.
    FileOp,
    /// Arbitrary terminal command.
    Terminal,
    /// Read-only system query whose output is rephrased by the model.
    SystemInfo,
    /// Search for a video and open it.
    PlayYoutube,
    /// Message a contact through the desktop messaging app.
    SendWhatsapp,
}

impl CommandKind {
    /// Return all command kinds.
    pub fn all() -> &'static [CommandKind] {
        &[
            CommandKind::OpenApp,
            CommandKind::FileOp,
            CommandKind::Terminal,
            CommandKind::SystemInfo,
            CommandKind::PlayYoutube,
            CommandKind::SendWhatsapp,
        ]
    }

    /// Whether this kind runs its command text through the shell.
    pub fn is_shell_level(self) -> bool {
        matches!(
            self,
            CommandKind::OpenApp
                | CommandKind::FileOp
                | CommandKind::Terminal
                | CommandKind::SystemInfo
        )
    }

    /// Human-readable label used in permission prompts.
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::OpenApp => "open apps",
            CommandKind::FileOp => "file operations",
            CommandKind::Terminal => "terminal commands",
            CommandKind::SystemInfo => "system information",
            CommandKind::PlayYoutube => "play videos",
            CommandKind::SendWhatsapp => "send messages",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandKind::OpenApp => "open_app",
            CommandKind::FileOp => "file_op",
            CommandKind::Terminal => "terminal",
            CommandKind::SystemInfo => "system_info",
            CommandKind::PlayYoutube => "play_youtube",
            CommandKind::SendWhatsapp => "send_whatsapp",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an unknown command kind string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown command kind: {0:?}")]
pub struct CommandKindParseError(pub String);

impl FromStr for CommandKind {
    type Err = CommandKindParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open_app" => Ok(CommandKind::OpenApp),
            "file_op" => Ok(CommandKind::FileOp),
            "terminal" => Ok(CommandKind::Terminal),
            "system_info" => Ok(CommandKind::SystemInfo),
            "play_youtube" => Ok(CommandKind::PlayYoutube),
            "send_whatsapp" => Ok(CommandKind::SendWhatsapp),
            _ => Err(CommandKindParseError(s.to_owned())),
        }
    }
}

/// A command extracted from one model reply. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub command: String,
    pub description: String,
    /// Derived from `kind` and `command`, never supplied by the model.
    pub risk: RiskLevel,
}

impl ParsedCommand {
    /// Build a command, deriving its risk tier.
    pub fn new(kind: CommandKind, command: impl Into<String>, description: impl Into<String>) -> Self {
        let command = command.into();
        let risk = classify(kind, &command);
        Self {
            kind,
            command,
            description: description.into(),
            risk,
        }
    }
}

/// Action requested by a task tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Add,
    Complete,
    Delete,
    List,
}

impl FromStr for TaskAction {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(TaskAction::Add),
            "complete" => Ok(TaskAction::Complete),
            "delete" => Ok(TaskAction::Delete),
            "list" => Ok(TaskAction::List),
            _ => Err(()),
        }
    }
}

/// Task priority. Missing or unrecognised values default to `Medium`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Parse a priority, falling back to the default for anything unknown.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            _ => TaskPriority::Medium,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        })
    }
}

/// A to-do list mutation extracted from one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDirective {
    pub action: TaskAction,
    pub title: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<String>,
}

/// Result of looking for the first directive in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// The text carries no recognised tag.
    NoDirective,
    Command(ParsedCommand),
    Task(TaskDirective),
}

/// A model reply split into display text and its honoured directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Reply with every tag removed and surrounding whitespace trimmed.
    pub display_text: String,
    pub command: Option<ParsedCommand>,
    pub task: Option<TaskDirective>,
}

impl ParsedReply {
    /// Parse a raw model reply.
    pub fn parse(raw: &str) -> Self {
        Self {
            display_text: strip_directives(raw),
            command: parse_command(raw),
            task: parse_task(raw),
        }
    }

    /// Whether the reply carried neither a command nor a task.
    pub fn is_plain(&self) -> bool {
        self.command.is_none() && self.task.is_none()
    }
}

/// Extract the first command tag, if any.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let caps = COMMAND_TAG.captures(text)?;
    let kind = caps.get(1)?.as_str().parse::<CommandKind>().ok()?;
    let command = caps.get(2)?.as_str().trim();
    let description = caps.get(3)?.as_str().trim();
    Some(ParsedCommand::new(kind, command, description))
}

/// Extract the first task tag, if any.
pub fn parse_task(text: &str) -> Option<TaskDirective> {
    let caps = TASK_TAG.captures(text)?;
    let action = caps.get(1)?.as_str().parse::<TaskAction>().ok()?;
    let rest = caps.get(2).map_or("", |m| m.as_str());

    // `rest` is either empty or starts with the first separator.
    let mut fields = rest.split('|').skip(1).map(str::trim);
    let non_empty = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_owned);

    let title = non_empty(fields.next());
    let priority = fields
        .next()
        .map(TaskPriority::parse_or_default)
        .unwrap_or_default();
    let due_date = non_empty(fields.next());

    Some(TaskDirective {
        action,
        title,
        priority,
        due_date,
    })
}

/// Return whichever recognised tag appears first in the text.
pub fn parse_directive(text: &str) -> Directive {
    let command_at = COMMAND_TAG.find(text).map(|m| m.start());
    let task_at = TASK_TAG.find(text).map(|m| m.start());

    let command_first = match (command_at, task_at) {
        (None, None) => return Directive::NoDirective,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(t)) => c < t,
    };

    if command_first {
        parse_command(text).map_or(Directive::NoDirective, Directive::Command)
    } else {
        parse_task(text).map_or(Directive::NoDirective, Directive::Task)
    }
}

/// Remove every command and task tag, then trim.
///
/// Repeats until no tag remains so that removing one tag cannot splice the
/// halves of its neighbours into a new one; the result is a fixed point.
pub fn strip_directives(text: &str) -> String {
    let mut current = text.to_owned();
    loop {
        let without_commands = COMMAND_TAG.replace_all(&current, "");
        let stripped = TASK_TAG.replace_all(&without_commands, "").into_owned();
        if stripped == current {
            break;
        }
        current = stripped;
    }
    current.trim().to_owned()
}
