//! Response synthesis: text -> audio bytes -> playback, awaited as one step.

use crate::error::{CallError, CallResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub type AudioBytes = Vec<u8>;

/// Backend that turns text into audio bytes (WAV/MP3/PCM, whatever the player decodes).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> CallResult<AudioBytes>;
}

/// Audio output device.
pub trait AudioPlayer: Send + Sync {
    /// Start playing `audio`. The receiver resolves exactly once, when playback
    /// finishes or is stopped.
    fn play(&self, audio: AudioBytes) -> CallResult<oneshot::Receiver<()>>;

    /// Stop playback immediately and drop anything queued.
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Played,
    /// No audio was produced; the fallback delay was waited instead.
    Skipped(CallError),
}

pub struct ResponseSynthesizer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    fallback_delay: Duration,
    playing: AtomicBool,
}

impl ResponseSynthesizer {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        fallback_delay: Duration,
    ) -> Self {
        Self {
            synthesizer,
            player,
            fallback_delay,
            playing: AtomicBool::new(false),
        }
    }

    /// Speak `text` and resolve when playback completes.
    ///
    /// Never fails: if synthesis or playback cannot start, waits the fallback
    /// delay and reports `Skipped`. Only one `speak` may be in flight.
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        if self.playing.swap(true, Ordering::SeqCst) {
            warn!("speak() called while playback is active");
            return SpeakOutcome::Skipped(CallError::Playback("playback already active".into()));
        }
        let _guard = PlayingGuard(&self.playing);

        let audio = match self.synthesizer.synthesize(text).await {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                return self
                    .skip(CallError::Synthesis("synthesizer returned no audio".into()))
                    .await
            }
            Err(e) => return self.skip(e).await,
        };

        let done = match self.player.play(audio) {
            Ok(done) => done,
            Err(e) => return self.skip(e).await,
        };

        // A dropped sender means the player went away; treat it as finished.
        let _ = done.await;
        debug!("playback finished");
        SpeakOutcome::Played
    }

    /// Stop any playback. The pending `speak` resolves once the player
    /// signals completion.
    pub fn stop(&self) {
        self.player.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    async fn skip(&self, error: CallError) -> SpeakOutcome {
        warn!("speaking without audio: {}", error);
        tokio::time::sleep(self.fallback_delay).await;
        SpeakOutcome::Skipped(error)
    }
}

/// Clears the playing flag even when the `speak` future is dropped mid-await.
struct PlayingGuard<'a>(&'a AtomicBool);

impl Drop for PlayingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
