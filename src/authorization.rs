//! Tiered consent gate for parsed commands.
//!
//! Three levels of friction:
//!
//! - Dedicated executors (`play_youtube`, `send_whatsapp`) and kinds with a
//!   standing grant run immediately, unless the command is high risk.
//! - Low and medium risk commands need one confirmation, with an optional
//!   "always allow" grant for the kind.
//! - High risk commands need two confirmations followed by a step-up secret
//!   checked by a [`StepUpAuthenticator`]. A standing grant never skips this.
//!
//! The gate holds at most one pending command. Submitting a new one replaces
//! whatever was waiting.

use std::fmt;

use tracing::{debug, info, warn};

use crate::directive::{CommandKind, ParsedCommand};
use crate::permissions::SharedPermissionSet;
use crate::risk::RiskLevel;

/// Verifies the secret entered on the final high-risk step.
pub trait StepUpAuthenticator: Send + Sync {
    /// Return `true` if `secret` authorizes the pending command.
    fn verify(&self, secret: &str) -> bool;
}

/// Shared passphrase read from `[authorization]` in the config.
///
/// An empty passphrase matches nothing, so high-risk commands stay blocked
/// until one is configured.
#[derive(Clone)]
pub struct StaticPassphrase {
    passphrase: String,
}

impl StaticPassphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl fmt::Debug for StaticPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticPassphrase").finish_non_exhaustive()
    }
}

impl StepUpAuthenticator for StaticPassphrase {
    fn verify(&self, secret: &str) -> bool {
        !self.passphrase.is_empty() && secret == self.passphrase
    }
}

/// A choice offered on a confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Deny,
    AllowOnce,
    AlwaysAllow,
    ImSure,
    ConfirmIrreversible,
    Cancel,
}

impl Decision {
    /// Button label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            Decision::Deny => "Deny",
            Decision::AllowOnce => "Allow once",
            Decision::AlwaysAllow => "Always allow",
            Decision::ImSure => "I'm sure",
            Decision::ConfirmIrreversible => "Yes, I understand this can't be undone",
            Decision::Cancel => "Cancel",
        }
    }
}

/// Where the gate currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Idle,
    AwaitingStep1(ParsedCommand),
    AwaitingStep2(ParsedCommand),
    AwaitingStep3(ParsedCommand),
}

impl GateState {
    /// The command awaiting consent, if any.
    pub fn pending(&self) -> Option<&ParsedCommand> {
        match self {
            GateState::Idle => None,
            GateState::AwaitingStep1(c) | GateState::AwaitingStep2(c) | GateState::AwaitingStep3(c) => {
                Some(c)
            }
        }
    }

    fn step(&self) -> u8 {
        match self {
            GateState::Idle => 0,
            GateState::AwaitingStep1(_) => 1,
            GateState::AwaitingStep2(_) => 2,
            GateState::AwaitingStep3(_) => 3,
        }
    }
}

/// Renderable snapshot of the current confirmation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptView {
    /// 1, 2 or 3.
    pub step: u8,
    pub command: ParsedCommand,
    pub message: String,
    /// Decisions the user may pick. Empty on step 3 apart from `Cancel`.
    pub choices: Vec<Decision>,
    /// Whether a secret must be entered.
    pub needs_secret: bool,
    /// Current contents of the secret input. Cleared after every attempt.
    pub secret_input: String,
    /// Transient error from the last attempt.
    pub error: Option<String>,
}

/// Result of feeding the gate a command or a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Run the command now. `granted` is set when this decision added a
    /// standing approval that the caller should persist.
    Dispatch { command: ParsedCommand, granted: bool },
    /// Show this prompt and wait for a decision.
    Prompt(PromptView),
    /// The user declined. The message is shown as an assistant reply.
    Denied(String),
    /// Dismissed without any message.
    Cancelled,
    /// The decision does not apply to the current state.
    Ignored,
}

const DENIED_MESSAGE: &str = "No problem, I won't run that.";
const WRONG_SECRET: &str = "That password isn't right. Try again.";

/// The consent state machine.
pub struct AuthorizationGate {
    state: GateState,
    permissions: SharedPermissionSet,
    authenticator: Box<dyn StepUpAuthenticator>,
    secret_input: String,
    error: Option<String>,
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    pub fn new(permissions: SharedPermissionSet, authenticator: Box<dyn StepUpAuthenticator>) -> Self {
        Self {
            state: GateState::Idle,
            permissions,
            authenticator,
            secret_input: String::new(),
            error: None,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GateState::Idle)
    }

    /// Offer a freshly parsed command. Replaces any pending command.
    pub fn submit(&mut self, command: ParsedCommand) -> GateOutcome {
        if let Some(previous) = self.state.pending() {
            debug!(
                previous = %previous.kind,
                next = %command.kind,
                "replacing pending command"
            );
        }
        self.reset_input();

        if matches!(command.kind, CommandKind::PlayYoutube | CommandKind::SendWhatsapp) {
            info!(kind = %command.kind, "auto-approved dedicated executor");
            self.state = GateState::Idle;
            return GateOutcome::Dispatch {
                command,
                granted: false,
            };
        }

        if command.risk != RiskLevel::High && self.has_grant(command.kind) {
            info!(kind = %command.kind, risk = %command.risk, "standing grant, dispatching");
            self.state = GateState::Idle;
            return GateOutcome::Dispatch {
                command,
                granted: false,
            };
        }

        info!(kind = %command.kind, risk = %command.risk, "awaiting consent");
        self.state = GateState::AwaitingStep1(command);
        self.prompt_outcome()
    }

    /// Apply a button decision to the current step.
    pub fn decide(&mut self, decision: Decision) -> GateOutcome {
        let state = std::mem::take(&mut self.state);
        match (state, decision) {
            (GateState::AwaitingStep1(cmd), Decision::Deny) => {
                info!(kind = %cmd.kind, "command denied");
                self.finish();
                GateOutcome::Denied(DENIED_MESSAGE.to_owned())
            }
            (GateState::AwaitingStep1(cmd), Decision::AllowOnce) if cmd.risk != RiskLevel::High => {
                info!(kind = %cmd.kind, "allowed once");
                self.finish();
                GateOutcome::Dispatch {
                    command: cmd,
                    granted: false,
                }
            }
            (GateState::AwaitingStep1(cmd), Decision::AlwaysAllow) if cmd.risk != RiskLevel::High => {
                let granted = self.grant(cmd.kind);
                info!(kind = %cmd.kind, "always allow granted");
                self.finish();
                GateOutcome::Dispatch {
                    command: cmd,
                    granted,
                }
            }
            (GateState::AwaitingStep1(cmd), Decision::ImSure) if cmd.risk == RiskLevel::High => {
                debug!(kind = %cmd.kind, "high risk step 1 acknowledged");
                self.state = GateState::AwaitingStep2(cmd);
                self.prompt_outcome()
            }
            (GateState::AwaitingStep2(cmd), Decision::ConfirmIrreversible) => {
                debug!(kind = %cmd.kind, "high risk step 2 confirmed");
                self.state = GateState::AwaitingStep3(cmd);
                self.prompt_outcome()
            }
            (GateState::AwaitingStep2(cmd) | GateState::AwaitingStep3(cmd), Decision::Cancel) => {
                info!(kind = %cmd.kind, "high risk command cancelled");
                self.finish();
                GateOutcome::Cancelled
            }
            (state, decision) => {
                debug!(?decision, step = state.step(), "decision ignored");
                self.state = state;
                GateOutcome::Ignored
            }
        }
    }

    /// Update the step 3 input buffer as the user types.
    pub fn set_secret_input(&mut self, input: impl Into<String>) {
        if matches!(self.state, GateState::AwaitingStep3(_)) {
            self.secret_input = input.into();
        }
    }

    /// Check the contents of the step 3 input buffer.
    pub fn submit_secret_input(&mut self) -> GateOutcome {
        let attempt = std::mem::take(&mut self.secret_input);
        self.submit_secret(&attempt)
    }

    /// Check a step-up secret for the pending high-risk command.
    ///
    /// A wrong secret keeps the gate on step 3 with a cleared input and a
    /// transient error.
    pub fn submit_secret(&mut self, attempt: &str) -> GateOutcome {
        let GateState::AwaitingStep3(cmd) = &self.state else {
            return GateOutcome::Ignored;
        };

        if self.authenticator.verify(attempt) {
            let command = cmd.clone();
            info!(kind = %command.kind, "step-up verified, dispatching");
            self.finish();
            GateOutcome::Dispatch {
                command,
                granted: false,
            }
        } else {
            warn!(kind = %cmd.kind, "step-up secret rejected");
            self.secret_input.clear();
            self.error = Some(WRONG_SECRET.to_owned());
            self.prompt_outcome()
        }
    }

    /// Snapshot of the current prompt, if one is showing.
    pub fn prompt(&self) -> Option<PromptView> {
        let (command, step) = match &self.state {
            GateState::Idle => return None,
            s => (s.pending()?.clone(), s.step()),
        };
        let high = command.risk == RiskLevel::High;

        let (message, choices) = match step {
            1 if high => (
                format!(
                    "This is a high-risk command: `{}`. {} Are you sure?",
                    command.command, command.description
                ),
                vec![Decision::Deny, Decision::ImSure],
            ),
            1 => (
                format!(
                    "I'd like to {}. Allow {}?",
                    lowercase_first(&command.description),
                    command.kind.label()
                ),
                vec![Decision::Deny, Decision::AllowOnce, Decision::AlwaysAllow],
            ),
            2 => (
                "This action may be irreversible. Do you want to continue?".to_owned(),
                vec![Decision::Cancel, Decision::ConfirmIrreversible],
            ),
            _ => (
                "Enter your password to run this command.".to_owned(),
                vec![Decision::Cancel],
            ),
        };

        Some(PromptView {
            step,
            command,
            message,
            choices,
            needs_secret: step == 3,
            secret_input: self.secret_input.clone(),
            error: self.error.clone(),
        })
    }

    fn prompt_outcome(&self) -> GateOutcome {
        self.prompt().map_or(GateOutcome::Ignored, GateOutcome::Prompt)
    }

    fn has_grant(&self, kind: CommandKind) -> bool {
        match self.permissions.lock() {
            Ok(set) => set.is_granted(kind),
            Err(poisoned) => poisoned.into_inner().is_granted(kind),
        }
    }

    fn grant(&self, kind: CommandKind) -> bool {
        match self.permissions.lock() {
            Ok(mut set) => set.grant(kind),
            Err(poisoned) => poisoned.into_inner().grant(kind),
        }
    }

    fn finish(&mut self) {
        self.state = GateState::Idle;
        self.reset_input();
    }

    fn reset_input(&mut self) {
        self.secret_input.clear();
        self.error = None;
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
