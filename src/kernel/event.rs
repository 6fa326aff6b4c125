use crate::error::CallError;
use crate::services::conversation::Reply;
use crate::speech::capture::CaptureEvent;
use crate::speech::synth::SpeakOutcome;

/// Monotonic id of one request/playback cycle, used to reject stale completions.
pub type TurnId = u64;

/// Everything the orchestrator reacts to. Timer fires, capture events and I/O
/// completions all arrive through the same queue and are handled in order.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Call clock advanced by one tick interval.
    Tick,
    /// One-shot hard limit fired.
    MaxDurationReached,
    Capture(CaptureEvent),
    ReplyReceived { turn: TurnId, reply: Reply },
    ReplyFailed { turn: TurnId, error: CallError },
    PlaybackFinished { turn: TurnId, outcome: SpeakOutcome },
    /// Hang-up requested through a `CallHandle`.
    EndRequested,
}

impl From<CaptureEvent> for CallEvent {
    fn from(event: CaptureEvent) -> Self {
        CallEvent::Capture(event)
    }
}
