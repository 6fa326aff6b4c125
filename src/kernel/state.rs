use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The explicit lifecycle states of a call.
/// Exactly one is active at any instant; `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Permissions requested, greeting not yet sent.
    Connecting,
    /// Capture is running, waiting for the user to finish an utterance.
    Listening,
    /// One request is in flight to the reasoning service.
    Processing,
    /// A reply is being synthesized or played.
    Speaking,
    Ended,
}

impl Default for CallState {
    fn default() -> Self {
        Self::Connecting
    }
}

impl CallState {
    /// Pure function: is `self -> to` a legal edge of the call graph?
    pub fn can_transition(self, to: CallState) -> bool {
        use CallState::*;

        match (self, to) {
            (Ended, _) => false,
            (_, Ended) => true,

            (Connecting, Processing) => true, // greeting
            (Processing, Speaking) => true,
            (Speaking, Listening) => true,
            (Listening, Processing) => true,
            (Listening, Speaking) => true, // local re-prompt, no request

            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CallState::Ended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    UserHangUp,
    MaxDuration,
    PermissionDenied,
}

/// Strict state delta. This is the ONLY way the session mutates.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    Transition(CallState),
    ElapsedAdvanced(Duration),
    WarningAcknowledged,
    TranscriptReset,
    TranscriptUpdated(String),
    ReplyUpdated(String),
    Cancelled,
    Ended(EndReason),
}

/// The single mutable aggregate of a call, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: Uuid,
    state: CallState,
    elapsed: Duration,
    warning_acknowledged: bool,
    cancelled: bool,
    last_transcript: String,
    last_reply_text: String,
    end_reason: Option<EndReason>,
    /// Bumped on every applied delta.
    pub version: u64,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl CallSession {
    pub fn new(call_id: Uuid) -> Self {
        Self {
            call_id,
            state: CallState::Connecting,
            elapsed: Duration::ZERO,
            warning_acknowledged: false,
            cancelled: false,
            last_transcript: String::new(),
            last_reply_text: String::new(),
            end_reason: None,
            version: 0,
        }
    }

    /// Pure reduction: Session + Delta -> Mutated Session.
    /// Returns false when the delta was rejected or had no effect.
    ///
    /// `Ended` absorbs everything. Once cancelled, only `Ended` is accepted.
    pub fn reduce(&mut self, delta: StateDelta) -> bool {
        if self.state.is_terminal() {
            debug!("session ended, dropping {:?}", delta);
            return false;
        }
        if self.cancelled && !matches!(delta, StateDelta::Ended(_)) {
            debug!("session cancelled, dropping {:?}", delta);
            return false;
        }

        match delta {
            StateDelta::Transition(to) => {
                if to == CallState::Ended {
                    warn!("Ended must be entered through StateDelta::Ended");
                    return false;
                }
                if !self.state.can_transition(to) {
                    warn!("rejected transition {:?} -> {:?}", self.state, to);
                    return false;
                }
                info!(from = ?self.state, to = ?to, "call state transition");
                self.state = to;
            }
            StateDelta::ElapsedAdvanced(step) => {
                self.elapsed += step;
            }
            StateDelta::WarningAcknowledged => {
                if self.warning_acknowledged {
                    return false;
                }
                self.warning_acknowledged = true;
            }
            StateDelta::TranscriptReset => {
                self.last_transcript.clear();
            }
            StateDelta::TranscriptUpdated(text) => {
                self.last_transcript = text;
            }
            StateDelta::ReplyUpdated(text) => {
                self.last_reply_text = text;
            }
            StateDelta::Cancelled => {
                self.cancelled = true;
            }
            StateDelta::Ended(reason) => {
                info!(from = ?self.state, reason = ?reason, "call ended");
                self.cancelled = true;
                self.state = CallState::Ended;
                self.end_reason = Some(reason);
            }
        }

        self.version += 1;
        true
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn warning_acknowledged(&self) -> bool {
        self.warning_acknowledged
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn last_transcript(&self) -> &str {
        &self.last_transcript
    }

    pub fn last_reply_text(&self) -> &str {
        &self.last_reply_text
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id,
            state: self.state,
            elapsed: self.elapsed,
            warning_acknowledged: self.warning_acknowledged,
            last_transcript: self.last_transcript.clone(),
            last_reply_text: self.last_reply_text.clone(),
            end_reason: self.end_reason,
            version: self.version,
        }
    }
}

/// Read-only copy of the session handed to UI layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSnapshot {
    pub call_id: Uuid,
    pub state: CallState,
    pub elapsed: Duration,
    pub warning_acknowledged: bool,
    pub last_transcript: String,
    pub last_reply_text: String,
    pub end_reason: Option<EndReason>,
    pub version: u64,
}
