//! Risk tiers for parsed commands.
//!
//! Classification is a fixed substring heuristic. It decides how much user
//! friction a command needs, not whether it may run at all: the execution
//! boundary keeps its own denylist.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::directive::CommandKind;

/// Risk tier attached to every parsed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

const FILE_DELETE_MARKERS: &[&str] = &["rm ", "rmdir", "delete", "remove", "unlink", "trash"];

const TERMINAL_DANGER_MARKERS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "sudo",
    "mkfs",
    "diskutil erase",
    "format ",
    "dd if=",
    "> /dev/",
    "chmod 777",
    "shutdown",
    "reboot",
    "kill -9",
    "killall",
];

/// Classify a command. Pure and deterministic.
pub fn classify(kind: CommandKind, command: &str) -> RiskLevel {
    match kind {
        CommandKind::OpenApp | CommandKind::SystemInfo | CommandKind::PlayYoutube => RiskLevel::Low,
        CommandKind::SendWhatsapp => RiskLevel::Medium,
        CommandKind::FileOp => escalate_on(command, FILE_DELETE_MARKERS),
        CommandKind::Terminal => escalate_on(command, TERMINAL_DANGER_MARKERS),
    }
}

fn escalate_on(command: &str, markers: &[&str]) -> RiskLevel {
    let lowered = command.to_lowercase();
    if markers.iter().any(|m| lowered.contains(m)) {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}
