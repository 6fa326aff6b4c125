use std::collections::VecDeque;
use super::event::{CallTelemetryEvent, FallbackKind, TurnKind};
use crate::kernel::state::EndReason;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMetrics {
    pub transitions: u64,
    /// Requests sent to the reasoning service, greeting included.
    pub service_requests: u64,
    pub turns: TurnStats,
    pub fallbacks: FallbackStats,
    pub reprompts: u64,
    pub actions_applied: u64,
    pub actions_ignored: u64,
    pub timers_invalidated: u64,
    pub end_reason: Option<EndReason>,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
    pub greetings: u64,
    pub replies: u64,
    pub fallbacks: u64,
    pub reprompts: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackStats {
    pub recognition: u64,
    pub network: u64,
    pub auth: u64,
    pub synthesis: u64,
}

impl FallbackStats {
    pub fn total(&self) -> u64 {
        self.recognition + self.network + self.auth + self.synthesis
    }
}

pub fn compute_metrics(events: &VecDeque<CallTelemetryEvent>) -> CallMetrics {
    let mut m = CallMetrics::default();

    for event in events {
        match event {
            CallTelemetryEvent::StateTransition { .. } => m.transitions += 1,
            CallTelemetryEvent::ServiceRequest { .. } => m.service_requests += 1,
            CallTelemetryEvent::TurnCompleted { kind } => match kind {
                TurnKind::Greeting => m.turns.greetings += 1,
                TurnKind::Reply => m.turns.replies += 1,
                TurnKind::Fallback => m.turns.fallbacks += 1,
                TurnKind::Reprompt => m.turns.reprompts += 1,
            },
            CallTelemetryEvent::Fallback { kind } => match kind {
                FallbackKind::Recognition => m.fallbacks.recognition += 1,
                FallbackKind::Network => m.fallbacks.network += 1,
                FallbackKind::Auth => m.fallbacks.auth += 1,
                FallbackKind::Synthesis => m.fallbacks.synthesis += 1,
            },
            CallTelemetryEvent::Reprompt => m.reprompts += 1,
            CallTelemetryEvent::ActionApplied { .. } => m.actions_applied += 1,
            CallTelemetryEvent::ActionIgnored => m.actions_ignored += 1,
            CallTelemetryEvent::TimersInvalidated { count } => m.timers_invalidated += *count as u64,
            CallTelemetryEvent::CallEnded { reason, elapsed_secs } => {
                m.end_reason = Some(*reason);
                m.elapsed_secs = *elapsed_secs;
            }
        }
    }

    m
}
