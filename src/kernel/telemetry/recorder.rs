use std::collections::VecDeque;
use super::event::CallTelemetryEvent;
use super::metrics::{compute_metrics, CallMetrics};
use tracing::debug;

const MAX_EVENTS: usize = 10_000;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<CallTelemetryEvent>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(256),
        }
    }

    pub fn record(&mut self, event: CallTelemetryEvent) {
        debug!(?event, "telemetry");
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn events(&self) -> impl Iterator<Item = &CallTelemetryEvent> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn metrics(&self) -> CallMetrics {
        compute_metrics(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_bounded() {
        let mut recorder = TelemetryRecorder::new();
        for _ in 0..(MAX_EVENTS + 5) {
            recorder.record(CallTelemetryEvent::Reprompt);
        }
        recorder.record(CallTelemetryEvent::ActionIgnored);

        assert_eq!(recorder.len(), MAX_EVENTS);
        assert_eq!(recorder.events().last(), Some(&CallTelemetryEvent::ActionIgnored));
    }
}
