//! Speech capture: wraps the speech-to-text engine and decides when the user
//! has finished an utterance.
//!
//! Endpointing rules:
//! - every partial transcript re-arms the silence window; when it elapses the
//!   best text so far is finalized
//! - if no partial ever arrives within the absolute window the utterance is
//!   finalized empty
//! - any engine error finalizes immediately with whatever text was heard

use crate::error::CallResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Raw output of the speech-to-text engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Best transcript of the current utterance so far (replaces, not appends).
    Partial(String),
    Error(String),
}

/// Speech-to-text engine. Implementations own the microphone while capturing.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start_capture(&self) -> CallResult<mpsc::Receiver<RecognizerEvent>>;
    async fn stop_capture(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceEnd {
    /// Silence window elapsed after speech.
    Silence,
    /// Nothing was heard within the absolute window.
    NoSpeech,
    /// Engine failed or its stream closed; text is best-effort.
    RecognitionError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub end: UtteranceEnd,
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Events emitted by a capture session. `epoch` identifies the `begin` call
/// that produced them so a consumer can drop events from an earlier capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Partial { epoch: u64, text: String },
    Finalized { epoch: u64, utterance: Utterance },
}

impl CaptureEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            CaptureEvent::Partial { epoch, .. } | CaptureEvent::Finalized { epoch, .. } => *epoch,
        }
    }
}

pub struct SpeechCaptureSession {
    recognizer: Arc<dyn SpeechRecognizer>,
    silence_window: Duration,
    absolute_timeout: Duration,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl SpeechCaptureSession {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        silence_window: Duration,
        absolute_timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            silence_window,
            absolute_timeout,
            epoch: 0,
            task: None,
        }
    }

    /// Start capturing. Events are delivered to `sink`; exactly one
    /// `Finalized` ends every capture that is not stopped first.
    /// Any capture still running is stopped before the new one starts.
    pub async fn begin<E>(&mut self, sink: mpsc::Sender<E>) -> u64
    where
        E: From<CaptureEvent> + Send + 'static,
    {
        self.stop().await;

        self.epoch += 1;
        let epoch = self.epoch;
        let recognizer = Arc::clone(&self.recognizer);
        let silence_window = self.silence_window;
        let absolute_timeout = self.absolute_timeout;

        info!(epoch, "speech capture started");
        self.task = Some(tokio::spawn(async move {
            run_capture(recognizer, silence_window, absolute_timeout, epoch, sink).await;
        }));

        epoch
    }

    /// Cancel both timers and release the engine. Safe to call when idle.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.recognizer.stop_capture().await;
            debug!(epoch = self.epoch, "speech capture stopped");
        }
    }

    /// True between `begin` and `stop`, even after the capture finalized.
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

async fn run_capture<E>(
    recognizer: Arc<dyn SpeechRecognizer>,
    silence_window: Duration,
    absolute_timeout: Duration,
    epoch: u64,
    sink: mpsc::Sender<E>,
) where
    E: From<CaptureEvent> + Send + 'static,
{
    let finalize = |text: String, end: UtteranceEnd| {
        info!(epoch, end = ?end, chars = text.len(), "utterance finalized");
        CaptureEvent::Finalized {
            epoch,
            utterance: Utterance { text, end },
        }
    };

    let mut engine = match recognizer.start_capture().await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("speech engine failed to start: {}", e);
            let _ = sink
                .send(finalize(String::new(), UtteranceEnd::RecognitionError).into())
                .await;
            return;
        }
    };

    let mut best = String::new();
    let mut heard = false;

    let absolute = sleep(absolute_timeout);
    tokio::pin!(absolute);
    let silence = sleep(silence_window);
    tokio::pin!(silence);

    let event = loop {
        tokio::select! {
            incoming = engine.recv() => match incoming {
                Some(RecognizerEvent::Partial(text)) => {
                    debug!(epoch, "partial transcript");
                    heard = true;
                    silence.as_mut().reset(Instant::now() + silence_window);
                    best = text.clone();
                    if sink.send(CaptureEvent::Partial { epoch, text }.into()).await.is_err() {
                        return;
                    }
                }
                Some(RecognizerEvent::Error(e)) => {
                    warn!("speech engine error: {}", e);
                    break finalize(best, UtteranceEnd::RecognitionError);
                }
                None => {
                    warn!("speech engine stream closed");
                    break finalize(best, UtteranceEnd::RecognitionError);
                }
            },
            _ = &mut silence, if heard => {
                break finalize(best, UtteranceEnd::Silence);
            }
            _ = &mut absolute, if !heard => {
                break finalize(String::new(), UtteranceEnd::NoSpeech);
            }
        }
    };

    let _ = sink.send(event.into()).await;
}
