//! The call state machine and turn cycle.
//!
//! greet -> speak -> listen -> think -> speak -> listen ...
//!
//! All inputs (timer fires, capture events, network and playback completions,
//! hang-up requests) arrive on one queue and are handled in order by a single
//! task, so the session has exactly one writer. Long operations run in spawned
//! tasks that post their result back; every result is checked against the
//! cancellation token and the current turn before it may touch the session.

use super::duration::DurationGuard;
use super::event::{CallEvent, TurnId};
use super::state::{CallSession, CallSnapshot, CallState, EndReason, StateDelta};
use super::telemetry::{CallMetrics, CallTelemetryEvent, FallbackKind, TelemetryRecorder, TurnKind};
use super::timer::TimerSet;
use crate::audio::{AudioMode, AudioRoute};
use crate::config::CallConfig;
use crate::error::{CallError, CallResult};
use crate::services::actions::{ActionDispatcher, ActionEnvelope, DispatchOutcome, DomainStores};
use crate::services::conversation::{ConversationClient, Reply, SessionMetadata};
use crate::speech::capture::{CaptureEvent, SpeechCaptureSession, SpeechRecognizer, UtteranceEnd};
use crate::speech::synth::{AudioPlayer, ResponseSynthesizer, SpeakOutcome, SpeechSynthesizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const EVENT_QUEUE_SIZE: usize = 64;

/// External collaborators, injected so every one can be faked.
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    pub audio: Arc<dyn AudioRoute>,
    pub conversation: Arc<dyn ConversationClient>,
    pub stores: Arc<dyn DomainStores>,
}

/// Cloneable hang-up handle.
#[derive(Clone)]
pub struct CallHandle {
    cancel: CancellationToken,
    tx: mpsc::Sender<CallEvent>,
}

impl CallHandle {
    /// End the call. Safe from any task, in any state, any number of times.
    pub fn end_call(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("end_call requested");
        self.cancel.cancel();
        // The token alone is enough; the event just wakes an idle queue.
        let _ = self.tx.try_send(CallEvent::EndRequested);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What is left of a call once it has ended.
#[derive(Debug, Clone)]
pub struct CallReport {
    pub call_id: Uuid,
    pub end_reason: Option<EndReason>,
    pub elapsed: Duration,
    pub metrics: CallMetrics,
    pub telemetry: Vec<CallTelemetryEvent>,
    /// Timers still able to fire after teardown. Always zero.
    pub timers_active: usize,
    pub capture_active: bool,
    pub playback_active: bool,
}

pub struct TurnOrchestrator {
    config: CallConfig,
    session: CallSession,
    guard: DurationGuard,
    timers: TimerSet<CallEvent>,
    capture: SpeechCaptureSession,
    synthesizer: Arc<ResponseSynthesizer>,
    conversation: Arc<dyn ConversationClient>,
    dispatcher: ActionDispatcher,
    audio: Arc<dyn AudioRoute>,
    pub telemetry: TelemetryRecorder,

    cancel: CancellationToken,
    tx: mpsc::Sender<CallEvent>,
    rx: mpsc::Receiver<CallEvent>,
    snapshots: watch::Sender<CallSnapshot>,

    turn: TurnId,
    greeting_turn: Option<TurnId>,
    speaking_kind: TurnKind,
    // In-flight request. Dropping detaches it; its result is then discarded
    // by the cancellation check.
    request: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
    started: bool,
}

impl TurnOrchestrator {
    /// Rejects an invalid config before anything is spawned.
    pub fn new(config: CallConfig, collaborators: Collaborators) -> CallResult<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let session = CallSession::new(Uuid::new_v4());
        let (snapshots, _) = watch::channel(session.snapshot());

        let capture = SpeechCaptureSession::new(
            collaborators.recognizer,
            config.silence_window,
            config.absolute_timeout,
        );
        let synthesizer = Arc::new(ResponseSynthesizer::new(
            collaborators.synthesizer,
            collaborators.player,
            config.synthesis_fallback_delay,
        ));

        Ok(Self {
            guard: DurationGuard::new(&config),
            timers: TimerSet::new(tx.clone()),
            capture,
            synthesizer,
            conversation: collaborators.conversation,
            dispatcher: ActionDispatcher::new(collaborators.stores),
            audio: collaborators.audio,
            telemetry: TelemetryRecorder::new(),
            cancel: CancellationToken::new(),
            tx,
            rx,
            snapshots,
            session,
            config,
            turn: 0,
            greeting_turn: None,
            speaking_kind: TurnKind::Greeting,
            request: None,
            playback: None,
            started: false,
        })
    }

    pub fn handle(&self) -> CallHandle {
        CallHandle {
            cancel: self.cancel.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Read-only view of the session, updated on every applied delta.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Acquire the audio device, arm the duration guard and send the greeting.
    ///
    /// The only fallible step of a call: a refused permission ends the call
    /// before it ever listens. A second call returns `AlreadyStarted`.
    pub async fn start_call(&mut self) -> CallResult<()> {
        if self.started {
            return Err(CallError::AlreadyStarted);
        }
        self.started = true;
        info!(call_id = %self.session.call_id, "starting call");

        if let Err(e) = self.audio.request_permissions().await {
            error!("call refused: {}", e);
            self.teardown(EndReason::PermissionDenied).await;
            return Err(match e {
                CallError::PermissionDenied(_) => e,
                other => CallError::PermissionDenied(other.to_string()),
            });
        }

        self.guard.arm(&mut self.timers);

        let sentinel = self.config.greeting_sentinel.clone();
        if let Some(turn) = self.request_reply(sentinel) {
            self.greeting_turn = Some(turn);
        }
        Ok(())
    }

    /// Drive the call until it ends.
    pub async fn run(mut self) -> CallReport {
        if !self.started {
            warn!("run() called before start_call(); ending call");
            self.teardown(EndReason::UserHangUp).await;
        }

        while !self.session.state().is_terminal() {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => CallEvent::EndRequested,
                event = self.rx.recv() => event.unwrap_or(CallEvent::EndRequested),
            };
            self.on_event(event).await;
        }

        self.report()
    }

    async fn on_event(&mut self, event: CallEvent) {
        match event {
            CallEvent::Tick => self.sync_clock(),
            CallEvent::MaxDurationReached => {
                warn!(max_secs = self.guard.max().as_secs(), "max call duration reached");
                self.teardown(EndReason::MaxDuration).await;
            }
            CallEvent::EndRequested => self.teardown(EndReason::UserHangUp).await,
            CallEvent::Capture(event) => self.on_capture(event).await,
            CallEvent::ReplyReceived { turn, reply } => self.on_reply(turn, Ok(reply)).await,
            CallEvent::ReplyFailed { turn, error } => self.on_reply(turn, Err(error)).await,
            CallEvent::PlaybackFinished { turn, outcome } => {
                self.on_playback_finished(turn, outcome).await
            }
        }
    }

    async fn on_capture(&mut self, event: CaptureEvent) {
        if self.session.state() != CallState::Listening || event.epoch() != self.capture.epoch() {
            debug!(epoch = event.epoch(), "dropping stale capture event");
            return;
        }

        match event {
            CaptureEvent::Partial { text, .. } => {
                self.apply(StateDelta::TranscriptUpdated(text));
            }
            CaptureEvent::Finalized { utterance, .. } => {
                self.capture.stop().await;
                if self.cancel.is_cancelled() {
                    return;
                }

                if utterance.end == UtteranceEnd::RecognitionError {
                    self.telemetry.record(CallTelemetryEvent::Fallback {
                        kind: FallbackKind::Recognition,
                    });
                }

                if utterance.is_empty() {
                    info!(end = ?utterance.end, "nothing heard, re-prompting");
                    self.telemetry.record(CallTelemetryEvent::Reprompt);
                    let text = self.config.reprompt_reply.clone();
                    self.speak(text, TurnKind::Reprompt).await;
                } else {
                    let text = utterance.text.trim().to_string();
                    self.apply(StateDelta::TranscriptUpdated(text.clone()));
                    self.request_reply(text);
                }
            }
        }
    }

    async fn on_reply(&mut self, turn: TurnId, result: CallResult<Reply>) {
        if self.is_stale(turn, CallState::Processing) {
            debug!(turn, "dropping stale reply");
            return;
        }
        self.request = None;

        let (text, kind) = match result {
            Ok(reply) => {
                if let Some(action) = &reply.action {
                    self.dispatch(action);
                }
                let kind = if self.greeting_turn == Some(turn) {
                    TurnKind::Greeting
                } else {
                    TurnKind::Reply
                };
                (reply.text, kind)
            }
            Err(e) => {
                warn!("reasoning service failed, speaking fallback: {}", e);
                let kind = match e {
                    CallError::Auth(_) => FallbackKind::Auth,
                    _ => FallbackKind::Network,
                };
                self.telemetry.record(CallTelemetryEvent::Fallback { kind });
                (self.config.fallback_reply.clone(), TurnKind::Fallback)
            }
        };

        self.speak(text, kind).await;
    }

    async fn on_playback_finished(&mut self, turn: TurnId, outcome: SpeakOutcome) {
        if self.is_stale(turn, CallState::Speaking) {
            debug!(turn, "dropping stale playback completion");
            return;
        }
        self.playback = None;

        if let SpeakOutcome::Skipped(e) = &outcome {
            debug!("turn spoken without audio ({})", e.kind());
            self.telemetry.record(CallTelemetryEvent::Fallback {
                kind: FallbackKind::Synthesis,
            });
        }
        self.telemetry.record(CallTelemetryEvent::TurnCompleted {
            kind: self.speaking_kind,
        });

        self.sync_clock();
        if self.guard.exceeded(self.session.elapsed()) {
            self.teardown(EndReason::MaxDuration).await;
            return;
        }

        self.listen().await;
    }

    /// Processing: one request in flight. Returns the turn id it was sent under.
    fn request_reply(&mut self, content: String) -> Option<TurnId> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if !self.apply(StateDelta::Transition(CallState::Processing)) {
            return None;
        }
        let turn = self.next_turn();
        let greeting = content == self.config.greeting_sentinel;
        self.telemetry.record(CallTelemetryEvent::ServiceRequest { greeting });

        let client = Arc::clone(&self.conversation);
        let metadata = SessionMetadata {
            call_id: self.session.call_id,
            apps_blocked: self.dispatcher.apps_blocked(),
        };
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        self.request = Some(tokio::spawn(async move {
            let result = client.send(&content, &metadata).await;
            if cancel.is_cancelled() {
                debug!(turn, "call cancelled, discarding reply");
                return;
            }
            let event = match result {
                Ok(reply) => CallEvent::ReplyReceived { turn, reply },
                Err(error) => CallEvent::ReplyFailed { turn, error },
            };
            let _ = tx.send(event).await;
        }));

        Some(turn)
    }

    /// Speaking: capture is stopped before the device switches to playback.
    async fn speak(&mut self, text: String, kind: TurnKind) {
        self.apply(StateDelta::ReplyUpdated(text.clone()));
        if !self.apply(StateDelta::Transition(CallState::Speaking)) {
            return;
        }
        self.speaking_kind = kind;

        self.capture.stop().await;
        if self.cancel.is_cancelled() {
            return;
        }
        self.switch_mode(AudioMode::Playback);

        let turn = self.next_turn();
        let synthesizer = Arc::clone(&self.synthesizer);
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        self.playback = Some(tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = synthesizer.speak(&text) => outcome,
                _ = cancel.cancelled() => return,
            };
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(CallEvent::PlaybackFinished { turn, outcome }).await;
        }));
    }

    /// Listening: playback has completed, so the device is free to record.
    async fn listen(&mut self) {
        if !self.apply(StateDelta::Transition(CallState::Listening)) {
            return;
        }
        self.apply(StateDelta::TranscriptReset);
        self.switch_mode(AudioMode::Record);
        self.capture.begin(self.tx.clone()).await;
        if self.cancel.is_cancelled() {
            self.capture.stop().await;
        }
    }

    /// Shared by hang-up, max duration and refused permissions.
    async fn teardown(&mut self, reason: EndReason) {
        if self.session.state().is_terminal() {
            return;
        }
        info!(reason = ?reason, "tearing down call");

        for delta in self.guard.on_tick(&self.session) {
            self.commit(delta);
        }
        self.cancel.cancel();
        self.commit(StateDelta::Cancelled);

        self.capture.stop().await;
        self.synthesizer.stop();
        if let Some(playback) = self.playback.take() {
            playback.abort();
            let _ = playback.await;
        }
        self.request = None;

        let count = self.timers.invalidate_all();
        self.telemetry.record(CallTelemetryEvent::TimersInvalidated { count });
        self.audio.release();

        self.commit(StateDelta::Ended(reason));
        self.telemetry.record(CallTelemetryEvent::CallEnded {
            reason,
            elapsed_secs: self.session.elapsed().as_secs(),
        });
    }

    fn dispatch(&mut self, action: &ActionEnvelope) {
        match self.dispatcher.apply(action) {
            DispatchOutcome::Applied(kind) => {
                self.telemetry.record(CallTelemetryEvent::ActionApplied {
                    kind: kind.as_str().to_string(),
                });
            }
            DispatchOutcome::Skipped(_) | DispatchOutcome::Ignored(_) => {
                self.telemetry.record(CallTelemetryEvent::ActionIgnored);
            }
        }
    }

    fn switch_mode(&self, mode: AudioMode) {
        if let Err(e) = self.audio.set_mode(mode) {
            warn!("audio mode switch to {:?} failed: {}", mode, e);
        }
    }

    fn is_stale(&self, turn: TurnId, expected: CallState) -> bool {
        self.cancel.is_cancelled() || turn != self.turn || self.session.state() != expected
    }

    fn next_turn(&mut self) -> TurnId {
        self.turn += 1;
        self.turn
    }

    fn sync_clock(&mut self) {
        for delta in self.guard.on_tick(&self.session) {
            self.apply(delta);
        }
    }

    /// Once the call is cancelled only teardown may touch the session.
    fn apply(&mut self, delta: StateDelta) -> bool {
        if self.cancel.is_cancelled() {
            debug!("call cancelled, dropping {:?}", delta);
            return false;
        }
        self.commit(delta)
    }

    fn commit(&mut self, delta: StateDelta) -> bool {
        let from = self.session.state();
        if !self.session.reduce(delta) {
            return false;
        }
        let to = self.session.state();
        if from != to {
            self.telemetry.record(CallTelemetryEvent::StateTransition { from, to });
        }
        self.snapshots.send_replace(self.session.snapshot());
        true
    }

    fn report(&self) -> CallReport {
        CallReport {
            call_id: self.session.call_id,
            end_reason: self.session.end_reason(),
            elapsed: self.session.elapsed(),
            metrics: self.telemetry.metrics(),
            telemetry: self.telemetry.events().cloned().collect(),
            timers_active: self.timers.active(),
            capture_active: self.capture.is_active(),
            playback_active: self.synthesizer.is_playing(),
        }
    }
}
