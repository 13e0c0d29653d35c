//! Conversation orchestrator.
//!
//! One user turn runs: model completion, tag extraction, the consent gate,
//! dispatch of an approved command, then the task directive. The cleaned
//! reply is stored, announced on the [`Notifier`] and spoken with the voice
//! loop paused.
//!
//! Only one request runs at a time. A second submission while one is in
//! flight fails with [`AssistantError::Busy`].

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::authorization::{
    AuthorizationGate, Decision, GateOutcome, PromptView, StaticPassphrase, StepUpAuthenticator,
};
use crate::config::AssistantConfig;
use crate::directive::ParsedReply;
use crate::dispatch::{CommandExecutor, Dispatcher, MediaResolver, SearchResolver, ShellExecutor};
use crate::error::{AssistantError, Result};
use crate::llm::persona::STATIC_GREETING;
use crate::llm::{ChatMessage, HttpModelProxy, ModelProxy};
use crate::permissions::{PermissionSet, SharedPermissionSet};
use crate::runtime::{AssistantEvent, Notifier, ToastLevel};
use crate::session::{ChatSession, FsSessionStore, SessionStore};
use crate::storage::{LocalState, StateStore, Theme};
use crate::tasks::{self, TaskEffect, TaskList};
use crate::voice::{NullSpeechOutput, SayPlayer, SpeechOutput, VoiceControl, WakeAction};

/// Everything one turn added to the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub session_id: String,
    /// New assistant messages, in order.
    pub messages: Vec<ChatMessage>,
    /// What was spoken aloud.
    pub spoken: String,
    /// Consent prompt left open by this turn.
    pub prompt: Option<PromptView>,
    /// A `list` task directive asked for the task panel.
    pub show_tasks: bool,
}

impl Reply {
    fn push(&mut self, text: impl Into<String>, spoken: &str) {
        let text = text.into();
        if !text.trim().is_empty() {
            self.messages.push(ChatMessage::assistant(text));
        }
        let spoken = spoken.trim();
        if !spoken.is_empty() {
            if !self.spoken.is_empty() {
                self.spoken.push(' ');
            }
            self.spoken.push_str(spoken);
        }
    }

    /// All new messages joined, for plain-text front ends.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The assistant.
pub struct Assistant {
    proxy: Arc<dyn ModelProxy>,
    sessions: Arc<dyn SessionStore>,
    dispatcher: Dispatcher,
    gate: Mutex<AuthorizationGate>,
    permissions: SharedPermissionSet,
    state: Mutex<StateStore>,
    notifier: Notifier,
    speech: Arc<dyn SpeechOutput>,
    voice: Option<Arc<dyn VoiceControl>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Assistant {
    /// Wire an assistant from its collaborators.
    pub fn new(
        config: &AssistantConfig,
        proxy: Arc<dyn ModelProxy>,
        sessions: Arc<dyn SessionStore>,
        executor: Arc<dyn CommandExecutor>,
        media: Arc<dyn MediaResolver>,
        state: StateStore,
    ) -> Self {
        let permissions = state.state().permissions.clone().into_shared();
        let authenticator: Box<dyn StepUpAuthenticator> =
            Box::new(StaticPassphrase::new(config.authorization.passphrase.clone()));
        let gate = AuthorizationGate::new(Arc::clone(&permissions), authenticator);
        let dispatcher = Dispatcher::new(
            executor,
            Arc::clone(&proxy),
            media,
            config.shell.clone(),
            config.automation.clone(),
        );
        Self {
            proxy,
            sessions,
            dispatcher,
            gate: Mutex::new(gate),
            permissions,
            state: Mutex::new(state),
            notifier: Notifier::disabled(),
            speech: Arc::new(NullSpeechOutput),
            voice: None,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the production stack: HTTP model proxy, on-disk sessions and
    /// state, the real shell executor and video search.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or an unusable session directory.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        config.validate()?;
        let proxy = HttpModelProxy::from_config(config.llm.clone())?;
        let sessions = FsSessionStore::new(config.storage.sessions_dir())?;
        let executor = ShellExecutor::new(&config.shell, &config.automation);
        let media = SearchResolver::new(config.search.clone());
        let state = StateStore::open(config.storage.state_file());

        let mut assistant = Self::new(
            config,
            Arc::new(proxy),
            Arc::new(sessions),
            Arc::new(executor),
            Arc::new(media),
            state,
        );
        if !config.voice.tts_program.trim().is_empty() {
            assistant = assistant.with_speech(Arc::new(SayPlayer::new(&config.voice.tts_program)));
        }
        Ok(assistant)
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechOutput>) -> Self {
        self.speech = speech;
        self
    }

    /// Pause this voice loop while speaking.
    pub fn with_voice(mut self, voice: Arc<dyn VoiceControl>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_authenticator(self, authenticator: Box<dyn StepUpAuthenticator>) -> Self {
        let gate = AuthorizationGate::new(Arc::clone(&self.permissions), authenticator);
        *self.lock_gate() = gate;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // ── Conversation ─────────────────────────────────────────────────

    /// Send a user message. With no `session_id` the active session is
    /// used, or a new one is created.
    ///
    /// # Errors
    ///
    /// [`AssistantError::Busy`] while another request runs;
    /// [`AssistantError::Validation`] for an empty message or unknown
    /// session. Model failures are not errors: they become an assistant
    /// message in the returned [`Reply`].
    pub async fn send(&self, session_id: Option<&str>, text: &str) -> Result<Reply> {
        let _busy = self.in_flight.try_lock().map_err(|_| AssistantError::Busy)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::Validation("the message is empty".into()));
        }

        let session = self.resolve_session(session_id).await?;
        let mut messages = session.messages;
        messages.push(ChatMessage::user(text));
        self.sessions
            .replace_messages(&session.id, messages.clone())
            .await?;

        let mut reply = Reply {
            session_id: session.id.clone(),
            ..Reply::default()
        };

        let raw = {
            let _thinking = self.notifier.thinking();
            self.proxy.complete(&messages).await
        };

        match raw {
            Ok(raw) => self.handle_model_reply(&raw, &mut reply).await,
            Err(e) => {
                warn!(code = e.code(), error = %e, "completion failed");
                let msg = e.friendly_message();
                reply.push(msg, msg);
            }
        }

        self.finish_turn(messages, reply).await
    }

    /// Answer the open consent prompt with a button decision.
    pub async fn decide(&self, decision: Decision) -> Result<Reply> {
        let _busy = self.in_flight.try_lock().map_err(|_| AssistantError::Busy)?;
        let outcome = self.lock_gate().decide(decision);
        self.resolve_gate_outcome(outcome).await
    }

    /// Answer step 3 of a high-risk prompt.
    pub async fn submit_secret(&self, attempt: &str) -> Result<Reply> {
        let _busy = self.in_flight.try_lock().map_err(|_| AssistantError::Busy)?;
        let outcome = self.lock_gate().submit_secret(attempt);
        self.resolve_gate_outcome(outcome).await
    }

    /// The open consent prompt, if any.
    pub fn pending_prompt(&self) -> Option<PromptView> {
        self.lock_gate().prompt()
    }

    /// Turn a wake-word hit into a turn or a greeting. Re-arms the voice
    /// loop afterwards either way.
    pub async fn handle_wake(&self, trailing: &str) -> Result<Reply> {
        let result = match WakeAction::from_trailing(trailing) {
            WakeAction::Command(text) => {
                info!("voice command received");
                self.send(None, &text).await
            }
            WakeAction::Greet(greeting) => {
                let mut reply = Reply::default();
                reply.push(greeting, greeting);
                self.announce(&reply).await;
                Ok(reply)
            }
        };
        if let Some(voice) = &self.voice {
            voice.resume();
        }
        result
    }

    async fn resolve_gate_outcome(&self, outcome: GateOutcome) -> Result<Reply> {
        let session = self.active_session().await?;
        let mut reply = Reply {
            session_id: session.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
            ..Reply::default()
        };
        self.apply_gate_outcome(outcome, &mut reply).await;

        match session {
            Some(session) => self.finish_turn(session.messages, reply).await,
            None => {
                self.announce(&reply).await;
                Ok(reply)
            }
        }
    }

    async fn handle_model_reply(&self, raw: &str, reply: &mut Reply) {
        let parsed = ParsedReply::parse(raw);
        debug!(
            command = parsed.command.is_some(),
            task = parsed.task.is_some(),
            "model reply parsed"
        );
        reply.push(parsed.display_text.clone(), &parsed.display_text);

        if let Some(command) = parsed.command {
            let outcome = self.lock_gate().submit(command);
            self.apply_gate_outcome(outcome, reply).await;
        }

        if let Some(directive) = parsed.task {
            self.apply_task(&directive, reply);
        }
    }

    async fn apply_gate_outcome(&self, outcome: GateOutcome, reply: &mut Reply) {
        match outcome {
            GateOutcome::Dispatch { command, granted } => {
                if granted {
                    self.persist_permissions();
                }
                self.notifier.emit(AssistantEvent::PromptClosed);
                let report = self.dispatcher.dispatch(&command).await;
                if !report.success {
                    self.notifier.toast(ToastLevel::Error, &report.spoken);
                }
                reply.push(report.display, &report.spoken);
            }
            GateOutcome::Prompt(view) => {
                self.notifier.emit(AssistantEvent::PermissionPrompt(view.clone()));
                reply.prompt = Some(view);
            }
            GateOutcome::Denied(message) => {
                self.notifier.emit(AssistantEvent::PromptClosed);
                reply.push(message.clone(), &message);
            }
            GateOutcome::Cancelled => self.notifier.emit(AssistantEvent::PromptClosed),
            GateOutcome::Ignored => {}
        }
    }

    fn apply_task(&self, directive: &crate::directive::TaskDirective, reply: &mut Reply) {
        let mut store = self.lock_state();
        let mut list = store.state().tasks.clone();
        let effect = tasks::apply_directive(&mut list, directive);

        if effect.mutated() {
            let pending = list.pending().count();
            if let Err(e) = store.set_tasks(list) {
                warn!(error = %e, "failed to persist tasks");
                self.notifier.toast(ToastLevel::Error, e.user_message());
            }
            self.notifier.emit(AssistantEvent::TasksChanged { pending });
        }

        match effect {
            TaskEffect::Added(task) => {
                self.notifier
                    .toast(ToastLevel::Success, format!("Task added: {}", task.title));
            }
            TaskEffect::Completed(task) => {
                self.notifier
                    .toast(ToastLevel::Success, format!("Task completed: {}", task.title));
            }
            TaskEffect::Deleted(task) => {
                self.notifier
                    .toast(ToastLevel::Info, format!("Task deleted: {}", task.title));
            }
            TaskEffect::ShowList(summary) => {
                reply.show_tasks = true;
                match reply.messages.last_mut() {
                    Some(last) => {
                        last.content.push_str("\n\n");
                        last.content.push_str(&summary);
                    }
                    None => reply.messages.push(ChatMessage::assistant(summary)),
                }
            }
            TaskEffect::NoMatch(title) => debug!(title, "no task matched"),
            TaskEffect::MissingTitle(action) => debug!(?action, "task directive ignored"),
        }
    }

    /// Store the new messages, then show and speak them.
    async fn finish_turn(&self, mut messages: Vec<ChatMessage>, reply: Reply) -> Result<Reply> {
        if !reply.messages.is_empty() && !reply.session_id.is_empty() {
            messages.extend(reply.messages.iter().cloned());
            self.sessions
                .replace_messages(&reply.session_id, messages)
                .await?;
        }
        self.announce(&reply).await;
        Ok(reply)
    }

    async fn announce(&self, reply: &Reply) {
        for message in &reply.messages {
            self.notifier.emit(AssistantEvent::Reply {
                display: message.content.clone(),
                spoken: reply.spoken.clone(),
            });
        }
        if reply.spoken.is_empty() {
            return;
        }
        if let Some(voice) = &self.voice {
            voice.pause();
        }
        self.speech.speak(&reply.spoken).await;
        if let Some(voice) = &self.voice {
            // Re-arms only once playback has finished.
            voice.resume();
        }
    }

    // ── Sessions ─────────────────────────────────────────────────────

    async fn resolve_session(&self, id: Option<&str>) -> Result<ChatSession> {
        if let Some(id) = id {
            let session = self
                .sessions
                .get(id)
                .await?
                .ok_or_else(|| AssistantError::Validation(format!("unknown session {id}")))?;
            self.set_active(Some(session.id.clone()));
            return Ok(session);
        }
        match self.active_session().await? {
            Some(session) => Ok(session),
            None => self.new_session().await,
        }
    }

    async fn active_session(&self) -> Result<Option<ChatSession>> {
        let id = self.lock_state().state().active_session.clone();
        match id {
            Some(id) => self.sessions.get(&id).await,
            None => Ok(None),
        }
    }

    /// Start a fresh chat and make it active.
    pub async fn new_session(&self) -> Result<ChatSession> {
        let session = self
            .sessions
            .create(vec![ChatMessage::assistant(STATIC_GREETING)])
            .await?;
        info!(id = %session.id, "new chat session");
        self.set_active(Some(session.id.clone()));
        Ok(session)
    }

    pub async fn sessions(&self) -> Result<Vec<ChatSession>> {
        self.sessions.list().await
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.sessions.delete(id).await?;
        let active = self.lock_state().state().active_session.clone();
        if active.as_deref() == Some(id) {
            self.set_active(None);
        }
        Ok(())
    }

    pub async fn clear_sessions(&self) -> Result<()> {
        self.sessions.clear_all().await?;
        self.set_active(None);
        Ok(())
    }

    fn set_active(&self, id: Option<String>) {
        if let Err(e) = self.lock_state().set_active_session(id) {
            warn!(error = %e, "failed to persist active session");
        }
    }

    // ── Local state ──────────────────────────────────────────────────

    pub fn local_state(&self) -> LocalState {
        self.lock_state().state().clone()
    }

    pub fn tasks(&self) -> TaskList {
        self.lock_state().state().tasks.clone()
    }

    /// Flip a task's completion by id. Returns false if no task has it.
    pub fn toggle_task(&self, id: &str) -> Result<bool> {
        self.lock_state().update(|s| s.tasks.toggle(id).is_some())
    }

    pub fn remove_task(&self, id: &str) -> Result<bool> {
        self.lock_state().update(|s| s.tasks.remove(id).is_some())
    }

    pub fn permissions(&self) -> PermissionSet {
        lock(&self.permissions).clone()
    }

    /// Forget every standing approval.
    pub fn reset_permissions(&self) -> Result<()> {
        lock(&self.permissions).reset();
        info!("permissions reset");
        self.lock_state().set_permissions(PermissionSet::default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.lock_state().set_theme(theme)
    }

    pub fn mark_onboarding_seen(&self) -> Result<()> {
        self.lock_state().mark_onboarding_seen()
    }

    fn persist_permissions(&self) {
        let snapshot = lock(&self.permissions).clone();
        if let Err(e) = self.lock_state().set_permissions(snapshot) {
            warn!(error = %e, "failed to persist permissions");
            self.notifier.toast(ToastLevel::Error, e.user_message());
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, AuthorizationGate> {
        lock(&self.gate)
    }

    fn lock_state(&self) -> MutexGuard<'_, StateStore> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
