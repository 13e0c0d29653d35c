//! Wake-word listener state machine.
//!
//! Drives a [`SpeechInput`] continuously while active, without listening to
//! its own voice: recognition never starts while the [`SpeechOutput`] is
//! speaking, and results that arrive during playback are dropped.
//!
//! `start`/`stop` own the master switch. `pause`/`resume` only gate whether
//! recognition may run. Every stop or pause bumps an epoch so that timers
//! and sessions started earlier notice they are stale and quietly exit.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::speech::{RecognitionError, RecognitionEvent, SpeechInput, SpeechOutput};
use super::wake::WakeMatcher;
use crate::config::VoiceConfig;

/// Snapshot of the listener's switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerFlags {
    /// Master switch.
    pub is_active: bool,
    /// Suppressed while the assistant speaks.
    pub is_paused: bool,
    /// A recognition session is open right now.
    pub is_running: bool,
}

/// Notifications for the UI and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Listening(bool),
    /// No recogniser on this platform.
    Unsupported,
    /// Wake word heard; carries the text after it. Recognition is stopped
    /// and stays stopped until [`WakeWordListener::resume`].
    Wake(String),
}

#[derive(Debug, Default)]
struct State {
    flags: ListenerFlags,
    epoch: u64,
}

struct Shared<I, O> {
    input: I,
    output: Arc<O>,
    matcher: WakeMatcher,
    min_confidence: f32,
    restart_delay: Duration,
    poll: Duration,
    state: Mutex<State>,
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl<I: SpeechInput, O: SpeechOutput> Shared<I, O> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ListenerEvent) {
        let _ = self.events.send(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        let state = self.lock();
        state.epoch == epoch && state.flags.is_active && !state.flags.is_paused
    }

    /// Invalidate outstanding work and close any open session.
    fn halt(&self) -> u64 {
        let (epoch, was_running) = {
            let mut state = self.lock();
            state.epoch += 1;
            (state.epoch, std::mem::take(&mut state.flags.is_running))
        };
        if was_running {
            self.input.stop();
            self.emit(ListenerEvent::Listening(false));
        }
        epoch
    }

    /// Mark the session closed if it still belongs to `epoch`.
    fn session_closed(&self, epoch: u64) -> bool {
        {
            let mut state = self.lock();
            if state.epoch != epoch || !state.flags.is_running {
                return false;
            }
            state.flags.is_running = false;
        }
        self.emit(ListenerEvent::Listening(false));
        true
    }

    fn deactivate(&self, epoch: u64) {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                return;
            }
            state.epoch += 1;
            state.flags.is_active = false;
            state.flags.is_running = false;
        }
        self.input.stop();
        self.emit(ListenerEvent::Listening(false));
    }
}

/// How a recognition session finished.
enum SessionEnd {
    Restart,
    Woke,
    Denied,
    Stale,
}

/// Continuous wake-word listener. Cheap to clone.
pub struct WakeWordListener<I, O> {
    shared: Arc<Shared<I, O>>,
}

impl<I, O> Clone for WakeWordListener<I, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, O> WakeWordListener<I, O>
where
    I: SpeechInput + 'static,
    O: SpeechOutput + 'static,
{
    /// Build a listener. Events arrive on the returned receiver.
    ///
    /// An empty `wake_words` list falls back to the default spellings.
    pub fn new(
        input: I,
        output: Arc<O>,
        config: &VoiceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let matcher = WakeMatcher::new(config.wake_words.iter().map(String::as_str))
            .or_else(|| WakeMatcher::new(super::wake::DEFAULT_WAKE_WORDS.iter().copied()))
            .unwrap_or_else(|| unreachable!("default wake words are non-empty"));
        let shared = Shared {
            input,
            output,
            matcher,
            min_confidence: config.min_confidence,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            poll: Duration::from_millis(config.speaking_poll_ms.max(1)),
            state: Mutex::new(State::default()),
            events,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            rx,
        )
    }

    pub fn flags(&self) -> ListenerFlags {
        self.shared.lock().flags
    }

    pub fn is_active(&self) -> bool {
        self.flags().is_active
    }

    /// Turn the listener on. Returns false if recognition is unsupported.
    pub fn start(&self) -> bool {
        if !self.shared.input.is_supported() {
            warn!("speech recognition is not supported");
            self.shared.emit(ListenerEvent::Unsupported);
            return false;
        }
        {
            let mut state = self.shared.lock();
            if state.flags.is_active {
                return true;
            }
            state.flags.is_active = true;
            state.flags.is_paused = false;
        }
        info!("wake-word listener started");
        let epoch = self.shared.halt();
        self.spawn_driver(epoch);
        true
    }

    /// Turn the listener off.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.flags.is_active = false;
            state.flags.is_paused = false;
        }
        self.shared.halt();
        info!("wake-word listener stopped");
    }

    /// Stop recognising immediately, leaving the master switch alone.
    pub fn pause(&self) {
        self.shared.lock().flags.is_paused = true;
        self.shared.halt();
        debug!("wake-word listener paused");
    }

    /// Re-arm recognition once speech playback is idle. No-op when off.
    ///
    /// Also the way to re-arm after a [`ListenerEvent::Wake`].
    pub fn resume(&self) {
        {
            let mut state = self.shared.lock();
            if !state.flags.is_active {
                return;
            }
            state.flags.is_paused = false;
        }
        let epoch = self.shared.halt();
        self.spawn_driver(epoch);
        debug!("wake-word listener resumed");
    }

    fn spawn_driver(&self, epoch: u64) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(drive(shared, epoch));
    }
}

impl<I, O> super::VoiceControl for WakeWordListener<I, O>
where
    I: SpeechInput + 'static,
    O: SpeechOutput + 'static,
{
    fn pause(&self) {
        WakeWordListener::pause(self);
    }

    fn resume(&self) {
        WakeWordListener::resume(self);
    }
}

/// One driver per epoch: open sessions back to back until told otherwise.
async fn drive<I, O>(shared: Arc<Shared<I, O>>, epoch: u64)
where
    I: SpeechInput,
    O: SpeechOutput,
{
    let mut delay = Duration::ZERO;
    loop {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !shared.is_current(epoch) {
            return;
        }
        if shared.output.is_speaking() {
            delay = shared.poll;
            continue;
        }

        let stream = match shared.input.start().await {
            Ok(stream) => stream,
            Err(RecognitionError::NotAllowed) => {
                warn!("microphone access denied, listener off");
                shared.deactivate(epoch);
                return;
            }
            Err(e) => {
                debug!(error = %e, "recognition failed to start, retrying");
                delay = shared.restart_delay;
                continue;
            }
        };

        {
            let mut state = shared.lock();
            if state.epoch != epoch {
                drop(state);
                shared.input.stop();
                return;
            }
            state.flags.is_running = true;
        }
        shared.emit(ListenerEvent::Listening(true));

        match run_session(&shared, epoch, stream).await {
            SessionEnd::Restart => {
                debug!(delay_ms = shared.restart_delay.as_millis(), "session ended, re-arming");
                delay = shared.restart_delay;
            }
            SessionEnd::Woke | SessionEnd::Denied | SessionEnd::Stale => return,
        }
    }
}

async fn run_session<I, O>(
    shared: &Shared<I, O>,
    epoch: u64,
    mut stream: super::speech::RecognitionStream,
) -> SessionEnd
where
    I: SpeechInput,
    O: SpeechOutput,
{
    while let Some(event) = stream.recv().await {
        if shared.lock().epoch != epoch {
            return SessionEnd::Stale;
        }
        match event {
            RecognitionEvent::Result {
                transcript,
                confidence,
                is_final,
            } => {
                if shared.output.is_speaking() {
                    debug!("dropping result heard during playback");
                    continue;
                }
                if !is_final || confidence < shared.min_confidence {
                    continue;
                }
                if let Some(rest) = shared.matcher.find(&transcript) {
                    {
                        let mut state = shared.lock();
                        state.epoch += 1;
                        state.flags.is_running = false;
                    }
                    shared.input.stop();
                    shared.emit(ListenerEvent::Listening(false));
                    info!(has_command = !rest.is_empty(), "wake word detected");
                    shared.emit(ListenerEvent::Wake(rest));
                    return SessionEnd::Woke;
                }
            }
            RecognitionEvent::Error(RecognitionError::NotAllowed) => {
                warn!("microphone access denied, listener off");
                shared.deactivate(epoch);
                return SessionEnd::Denied;
            }
            RecognitionEvent::Error(e) => {
                // The session ends right after; the restart happens on `End`.
                debug!(error = %e, "recognition error");
            }
            RecognitionEvent::End => break,
        }
    }

    if shared.session_closed(epoch) && shared.is_current(epoch) {
        SessionEnd::Restart
    } else {
        SessionEnd::Stale
    }
}
