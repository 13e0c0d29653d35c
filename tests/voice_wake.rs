//! Wake-word listener driven by a scripted recogniser.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use laila::config::VoiceConfig;
use laila::voice::{
    ListenerEvent, NullSpeechOutput, RecognitionError, RecognitionEvent, RecognitionStream,
    SpeechInput, WakeAction, WakeWordListener, find_wake_word,
};
use laila::voice::wake::GREETINGS;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct ScriptedInput {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

impl ScriptedInput {
    fn hear(&self, transcript: &str, confidence: f32) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(RecognitionEvent::Result {
                transcript: transcript.to_owned(),
                confidence,
                is_final: true,
            });
        }
    }
}

#[async_trait]
impl SpeechInput for ScriptedInput {
    async fn start(&self) -> Result<RecognitionStream, RecognitionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.tx.lock().unwrap().take();
    }
}

async fn next_wake(rx: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> String {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(ListenerEvent::Wake(text))) => return text,
            Ok(Some(_)) => continue,
            other => panic!("no wake event: {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn command_transcript_takes_the_command_path() {
    let input = ScriptedInput::default();
    let (listener, mut rx) =
        WakeWordListener::new(input.clone(), Arc::new(NullSpeechOutput), &VoiceConfig::default());
    assert!(listener.start());
    tokio::time::sleep(Duration::from_millis(10)).await;

    input.hear("hey laila what time is it", 0.8);
    let trailing = next_wake(&mut rx).await;
    assert_eq!(trailing, "what time is it");
    assert_eq!(
        WakeAction::from_trailing(&trailing),
        WakeAction::Command("what time is it".into())
    );
    assert!(!listener.flags().is_running);
}

#[tokio::test(start_paused = true)]
async fn bare_wake_word_takes_the_greeting_path() {
    let input = ScriptedInput::default();
    let (listener, mut rx) =
        WakeWordListener::new(input.clone(), Arc::new(NullSpeechOutput), &VoiceConfig::default());
    listener.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    input.hear("laila", 0.9);
    let trailing = next_wake(&mut rx).await;
    assert!(trailing.is_empty());
    for _ in 0..20 {
        match WakeAction::from_trailing(&trailing) {
            WakeAction::Greet(g) => assert!(GREETINGS.contains(&g)),
            WakeAction::Command(c) => panic!("greeting expected, got command {c:?}"),
        }
    }
}

#[test]
fn wake_word_followed_by_punctuation() {
    assert_eq!(find_wake_word("Lyla: play some jazz").as_deref(), Some("play some jazz"));
    assert!(find_wake_word("playlist please").is_none());
}
