//! Console harness: drives a real call against the configured reasoning
//! service, with stdin standing in for the microphone and stdout for the
//! speaker. Type a line to "say" it, `/bye` or Ctrl+C to hang up.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use voicecall::audio::{AudioMode, AudioRoute};
use voicecall::services::{DomainStores, HttpConversationClient};
use voicecall::speech::{AudioBytes, AudioPlayer, RecognizerEvent, SpeechRecognizer, SpeechSynthesizer};
use voicecall::{CallConfig, CallError, CallResult, Collaborators, TurnOrchestrator};

/// Per-word playback time of the console "speaker".
const WORD_DURATION: Duration = Duration::from_millis(250);

#[derive(Default)]
struct ConsoleRecognizer {
    listener: Mutex<Option<mpsc::Sender<RecognizerEvent>>>,
}

impl ConsoleRecognizer {
    /// Forward a typed line if a capture is running; drop it otherwise.
    fn hear(&self, line: String) {
        let listener = self.listener.lock().ok().and_then(|slot| slot.clone());
        match listener {
            Some(tx) => {
                let _ = tx.try_send(RecognizerEvent::Partial(line));
            }
            None => println!("(not listening, ignored)"),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for ConsoleRecognizer {
    async fn start_capture(&self) -> CallResult<mpsc::Receiver<RecognizerEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let mut slot = self
            .listener
            .lock()
            .map_err(|_| CallError::Recognition("console recognizer poisoned".into()))?;
        *slot = Some(tx);
        println!("[listening]");
        Ok(rx)
    }

    async fn stop_capture(&self) {
        if let Ok(mut slot) = self.listener.lock() {
            slot.take();
        }
    }
}

struct TextSynthesizer;

#[async_trait]
impl SpeechSynthesizer for TextSynthesizer {
    async fn synthesize(&self, text: &str) -> CallResult<AudioBytes> {
        Ok(text.as_bytes().to_vec())
    }
}

#[derive(Default)]
struct ConsolePlayer {
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl AudioPlayer for ConsolePlayer {
    fn play(&self, audio: AudioBytes) -> CallResult<oneshot::Receiver<()>> {
        let text = String::from_utf8(audio).map_err(|e| CallError::Playback(e.to_string()))?;
        println!("[assistant] {}", text);

        let words = text.split_whitespace().count().max(1) as u32;
        let (done_tx, done_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        if let Ok(mut slot) = self.stop.lock() {
            *slot = Some(stop_tx);
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(WORD_DURATION * words) => {}
                _ = stop_rx => {}
            }
            let _ = done_tx.send(());
        });
        Ok(done_rx)
    }

    fn stop(&self) {
        if let Some(stop) = self.stop.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = stop.send(());
        }
    }
}

struct ConsoleAudioRoute;

#[async_trait]
impl AudioRoute for ConsoleAudioRoute {
    async fn request_permissions(&self) -> CallResult<()> {
        Ok(())
    }

    fn set_mode(&self, mode: AudioMode) -> CallResult<()> {
        tracing::debug!("audio mode -> {:?}", mode);
        Ok(())
    }

    fn release(&self) {
        tracing::debug!("audio session released");
    }
}

/// Stores with nothing behind them; every refresh is only logged.
#[derive(Default)]
struct LoggingStores {
    blocked: AtomicBool,
}

#[async_trait]
impl DomainStores for LoggingStores {
    async fn refresh_quests(&self) {
        tracing::info!("stores: quests refreshed");
    }

    async fn refresh_routines(&self) {
        tracing::info!("stores: routines refreshed");
    }

    async fn notify_tasks_refreshed(&self) {
        tracing::info!("stores: tasks refreshed");
    }

    async fn start_app_blocking(&self) {
        self.blocked.store(true, Ordering::SeqCst);
        tracing::info!("stores: app blocking on");
    }

    async fn stop_app_blocking(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        tracing::info!("stores: app blocking off");
    }

    fn app_blocking_enabled(&self) -> bool {
        true
    }

    fn apps_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voicecall=info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let config = CallConfig::from_env().context("invalid call configuration")?;
    tracing::info!(url = %config.service_url, "voice call harness starting");

    let recognizer = Arc::new(ConsoleRecognizer::default());
    let collaborators = Collaborators {
        recognizer: recognizer.clone(),
        synthesizer: Arc::new(TextSynthesizer),
        player: Arc::new(ConsolePlayer::default()),
        audio: Arc::new(ConsoleAudioRoute),
        conversation: Arc::new(HttpConversationClient::new(&config)?),
        stores: Arc::new(LoggingStores::default()),
    };

    let mut orchestrator = TurnOrchestrator::new(config, collaborators)?;
    let handle = orchestrator.handle();

    let mut snapshots = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut last = snapshots.borrow().state;
        while snapshots.changed().await.is_ok() {
            let state = snapshots.borrow().state;
            if state != last {
                println!("[{:?}]", state);
                last = state;
            }
        }
    });

    let stdin_handle = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line == "/bye" {
                stdin_handle.end_call();
                break;
            }
            if !line.is_empty() {
                recognizer.hear(line);
            }
        }
    });

    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_handle.end_call();
        }
    });

    orchestrator.start_call().await?;
    let report = orchestrator.run().await;

    tracing::info!(
        call_id = %report.call_id,
        reason = ?report.end_reason,
        elapsed_secs = report.elapsed.as_secs(),
        turns = report.metrics.turns.replies + report.metrics.turns.greetings,
        fallbacks = report.metrics.fallbacks.total(),
        "call ended"
    );
    Ok(())
}
