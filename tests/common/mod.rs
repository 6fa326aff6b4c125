#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use voicecall::audio::{AudioMode, AudioRoute};
use voicecall::services::{ActionEnvelope, ConversationClient, DomainStores, Reply, SessionMetadata};
use voicecall::speech::{AudioBytes, AudioPlayer, RecognizerEvent, SpeechRecognizer, SpeechSynthesizer};
use voicecall::{CallConfig, CallError, CallResult, CallSnapshot, CallState, Collaborators, TurnOrchestrator};

/// Shared view of the audio device, used to catch capture/playback overlap.
#[derive(Default)]
pub struct Device {
    pub capturing: AtomicBool,
    pub playing: AtomicBool,
    pub overlaps: AtomicUsize,
}

pub struct FakeRecognizer {
    device: Arc<Device>,
    captures: mpsc::UnboundedSender<mpsc::Sender<RecognizerEvent>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// How long releasing the engine takes.
    pub stop_delay: Mutex<Duration>,
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn start_capture(&self) -> CallResult<mpsc::Receiver<RecognizerEvent>> {
        if self.device.playing.load(Ordering::SeqCst) {
            self.device.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.device.capturing.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);
        let _ = self.captures.send(tx);
        Ok(rx)
    }

    async fn stop_capture(&self) {
        let delay = *self.stop_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.device.capturing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSynthesizer {
    pub fail: AtomicBool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> CallResult<AudioBytes> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CallError::Synthesis("voice unavailable".into()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Plays for a fixed time per utterance unless stopped.
pub struct FakePlayer {
    device: Arc<Device>,
    pub play_time: Mutex<Duration>,
    pub played: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl AudioPlayer for FakePlayer {
    fn play(&self, audio: AudioBytes) -> CallResult<oneshot::Receiver<()>> {
        if self.device.capturing.load(Ordering::SeqCst) {
            self.device.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.device.playing.store(true, Ordering::SeqCst);
        self.played.lock().unwrap().push(String::from_utf8(audio).unwrap());

        let (done_tx, done_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.stop.lock().unwrap() = Some(stop_tx);

        let length = *self.play_time.lock().unwrap();
        let device = Arc::clone(&self.device);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(length) => {}
                _ = stop_rx => {}
            }
            device.playing.store(false, Ordering::SeqCst);
            let _ = done_tx.send(());
        });
        Ok(done_rx)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(stop) = self.stop.lock().unwrap().take() {
            let _ = stop.send(());
        }
    }
}

#[derive(Default)]
pub struct FakeAudio {
    pub deny: AtomicBool,
    pub modes: Mutex<Vec<AudioMode>>,
    pub released: AtomicBool,
}

#[async_trait]
impl AudioRoute for FakeAudio {
    async fn request_permissions(&self) -> CallResult<()> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::PermissionDenied("microphone".into()));
        }
        Ok(())
    }

    fn set_mode(&self, mode: AudioMode) -> CallResult<()> {
        self.modes.lock().unwrap().push(mode);
        Ok(())
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

pub enum Script {
    Reply(Reply),
    Fail(CallError),
    /// Hold the request until the notify fires, then reply.
    Gated(Arc<Notify>, Reply),
}

#[derive(Default)]
pub struct FakeConversation {
    pub script: Mutex<VecDeque<Script>>,
    pub sent: Mutex<Vec<String>>,
    pub metadata: Mutex<Vec<SessionMetadata>>,
    pub completed: AtomicUsize,
}

impl FakeConversation {
    pub fn push(&self, script: Script) {
        self.script.lock().unwrap().push_back(script);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationClient for FakeConversation {
    async fn send(&self, content: &str, metadata: &SessionMetadata) -> CallResult<Reply> {
        self.sent.lock().unwrap().push(content.to_string());
        self.metadata.lock().unwrap().push(metadata.clone());

        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(Script::Reply(reply)) => Ok(reply),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Gated(gate, reply)) => {
                gate.notified().await;
                Ok(reply)
            }
            None => Ok(reply("Okay.")),
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct FakeStores {
    pub calls: Mutex<Vec<&'static str>>,
    pub blocking_enabled: AtomicBool,
    pub blocked: AtomicBool,
}

impl FakeStores {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainStores for FakeStores {
    async fn refresh_quests(&self) {
        self.calls.lock().unwrap().push("quests");
    }
    async fn refresh_routines(&self) {
        self.calls.lock().unwrap().push("routines");
    }
    async fn notify_tasks_refreshed(&self) {
        self.calls.lock().unwrap().push("tasks");
    }
    async fn start_app_blocking(&self) {
        self.blocked.store(true, Ordering::SeqCst);
        self.calls.lock().unwrap().push("block");
    }
    async fn stop_app_blocking(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        self.calls.lock().unwrap().push("unblock");
    }
    fn app_blocking_enabled(&self) -> bool {
        self.blocking_enabled.load(Ordering::SeqCst)
    }
    fn apps_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }
}

pub struct Fakes {
    pub device: Arc<Device>,
    pub recognizer: Arc<FakeRecognizer>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub player: Arc<FakePlayer>,
    pub audio: Arc<FakeAudio>,
    pub conversation: Arc<FakeConversation>,
    pub stores: Arc<FakeStores>,
    /// One sender per capture started, in order.
    pub captures: mpsc::UnboundedReceiver<mpsc::Sender<RecognizerEvent>>,
}

impl Fakes {
    /// Wait for the next capture to start and return its event feed.
    pub async fn next_capture(&mut self) -> mpsc::Sender<RecognizerEvent> {
        tokio::time::timeout(Duration::from_secs(3600), self.captures.recv())
            .await
            .expect("no capture started")
            .expect("recognizer dropped")
    }

    pub fn played(&self) -> Vec<String> {
        self.player.played.lock().unwrap().clone()
    }

    pub fn overlaps(&self) -> usize {
        self.device.overlaps.load(Ordering::SeqCst)
    }
}

pub fn reply(text: &str) -> Reply {
    Reply {
        text: text.to_string(),
        action: None,
    }
}

pub fn reply_with_action(text: &str, kind: &str) -> Reply {
    Reply {
        text: text.to_string(),
        action: Some(ActionEnvelope::new(kind)),
    }
}

pub fn test_config() -> CallConfig {
    CallConfig::default()
}

pub fn build(config: CallConfig) -> (TurnOrchestrator, Fakes) {
    let (call, fakes) = try_build(config);
    (call.expect("invalid test config"), fakes)
}

pub fn try_build(config: CallConfig) -> (CallResult<TurnOrchestrator>, Fakes) {
    let device = Arc::new(Device::default());
    let (captures_tx, captures) = mpsc::unbounded_channel();

    let fakes = Fakes {
        recognizer: Arc::new(FakeRecognizer {
            device: Arc::clone(&device),
            captures: captures_tx,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            stop_delay: Mutex::new(Duration::ZERO),
        }),
        synthesizer: Arc::new(FakeSynthesizer {
            fail: AtomicBool::new(false),
        }),
        player: Arc::new(FakePlayer {
            device: Arc::clone(&device),
            play_time: Mutex::new(Duration::from_secs(2)),
            played: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            stop: Mutex::new(None),
        }),
        audio: Arc::new(FakeAudio::default()),
        conversation: Arc::new(FakeConversation::default()),
        stores: Arc::new(FakeStores::default()),
        device,
        captures,
    };

    let collaborators = Collaborators {
        recognizer: fakes.recognizer.clone(),
        synthesizer: fakes.synthesizer.clone(),
        player: fakes.player.clone(),
        audio: fakes.audio.clone(),
        conversation: fakes.conversation.clone(),
        stores: fakes.stores.clone(),
    };

    (TurnOrchestrator::new(config, collaborators), fakes)
}

pub async fn wait_for_state(rx: &mut watch::Receiver<CallSnapshot>, state: CallState) -> CallSnapshot {
    tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| s.state == state))
        .await
        .expect("state never reached")
        .expect("orchestrator dropped")
        .clone()
}

/// Say `text` as a single partial and let the silence window close it.
pub async fn say(capture: &mpsc::Sender<RecognizerEvent>, text: &str) {
    capture
        .send(RecognizerEvent::Partial(text.to_string()))
        .await
        .expect("capture already closed");
}
