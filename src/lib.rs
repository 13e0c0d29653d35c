//! Laila: a personal assistant that can act on the computer it runs on.
//!
//! The model answers in prose with optional inline tags. A turn flows:
//! chat input or voice → model → tag extraction → risk → consent gate →
//! dispatch → task directive → shown and spoken reply.
//!
//! # Architecture
//!
//! - **Grammar** ([`directive`]): `[COMMAND: …]` and `[TASK: …]` tags
//! - **Risk** ([`risk`]): fixed heuristic tiers per command
//! - **Consent** ([`authorization`], [`permissions`]): one-click for low and
//!   medium risk, three steps with a passphrase for high risk
//! - **Dispatch** ([`dispatch`]): shell behind a denylist, video lookup and
//!   messaging automation
//! - **Tasks** ([`tasks`]): local to-do list
//! - **Voice** ([`voice`]): wake-word listener that never hears itself
//! - **Collaborators**: [`llm`] model proxy, [`session`] transcripts,
//!   [`storage`] local state

pub mod assistant;
pub mod authorization;
pub mod config;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod laila_dirs;
pub mod llm;
pub mod permissions;
pub mod risk;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod voice;

pub use assistant::{Assistant, Reply};
pub use config::AssistantConfig;
pub use directive::{CommandKind, Directive, ParsedCommand, ParsedReply, parse_directive};
pub use error::{AssistantError, Result};
pub use risk::RiskLevel;
pub use runtime::{AssistantEvent, Notifier};
