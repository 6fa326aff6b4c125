use crate::kernel::state::{CallState, EndReason};
use serde::{Deserialize, Serialize};

// Allowed: states, kinds, counts, durations
// Forbidden: transcript text, reply text, action payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTelemetryEvent {
    StateTransition {
        from: CallState,
        to: CallState,
    },

    /// A request left for the reasoning service.
    ServiceRequest {
        greeting: bool,
    },

    TurnCompleted {
        kind: TurnKind,
    },

    Fallback {
        kind: FallbackKind,
    },

    /// Empty utterance answered locally.
    Reprompt,

    ActionApplied {
        kind: String,
    },

    ActionIgnored,

    TimersInvalidated {
        count: usize,
    },

    CallEnded {
        reason: EndReason,
        elapsed_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
    Greeting,
    Reply,
    Fallback,
    Reprompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackKind {
    Recognition,
    Network,
    Auth,
    Synthesis,
}
