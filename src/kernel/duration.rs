//! Call-duration bookkeeping: a periodic tick, a soft warning threshold and a
//! hard max-duration deadline.
//!
//! `elapsed` is read from the clock captured when the guard is armed, so a
//! stalled or skipped tick never makes the call look shorter than it is.
//!
//! The warning only flips `warning_acknowledged` on the session. Nothing in the
//! turn cycle reads it yet; it is kept as a hook for tone/pacing policy.

use super::event::CallEvent;
use super::state::{CallSession, StateDelta};
use super::timer::{TimerKind, TimerSet};
use crate::config::CallConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DurationGuard {
    tick: Duration,
    warning: Duration,
    max: Duration,
    started: Option<Instant>,
}

impl DurationGuard {
    pub fn new(config: &CallConfig) -> Self {
        Self {
            tick: config.tick_interval,
            warning: config.warning_threshold,
            max: config.max_duration,
            started: None,
        }
    }

    /// Start the call clock, the tick and the independent max-duration one-shot.
    pub fn arm(&mut self, timers: &mut TimerSet<CallEvent>) {
        self.started = Some(Instant::now());
        timers.every(TimerKind::Tick, self.tick, CallEvent::Tick);
        timers.once(TimerKind::MaxDuration, self.max, CallEvent::MaxDurationReached);
    }

    /// Bring the session's `elapsed` up to the wall clock. Empty before `arm`.
    pub fn on_tick(&self, session: &CallSession) -> Vec<StateDelta> {
        let Some(started) = self.started else {
            return Vec::new();
        };
        let elapsed = started.elapsed();

        let mut deltas = Vec::new();
        let step = elapsed.saturating_sub(session.elapsed());
        if !step.is_zero() {
            deltas.push(StateDelta::ElapsedAdvanced(step));
        }
        if elapsed >= self.warning && !session.warning_acknowledged() {
            info!(elapsed_secs = elapsed.as_secs(), "call warning threshold crossed");
            deltas.push(StateDelta::WarningAcknowledged);
        }

        deltas
    }

    pub fn exceeded(&self, elapsed: Duration) -> bool {
        elapsed >= self.max
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn guard() -> DurationGuard {
        DurationGuard::new(&CallConfig {
            warning_threshold: Duration::from_secs(3),
            max_duration: Duration::from_secs(5),
            ..CallConfig::default()
        })
    }

    fn armed(guard: &mut DurationGuard) -> TimerSet<CallEvent> {
        let (tx, _rx) = mpsc::channel(64);
        let mut timers = TimerSet::new(tx);
        guard.arm(&mut timers);
        timers
    }

    #[tokio::test(start_paused = true)]
    async fn warning_emitted_once_when_crossed() {
        let mut guard = guard();
        let _timers = armed(&mut guard);
        let mut session = CallSession::default();
        let mut warnings = 0;

        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(1)).await;
            for delta in guard.on_tick(&session) {
                if delta == StateDelta::WarningAcknowledged {
                    warnings += 1;
                }
                session.reduce(delta);
            }
        }

        assert_eq!(warnings, 1);
        assert!(session.warning_acknowledged());
        assert_eq!(session.elapsed(), Duration::from_secs(6));
        assert!(guard.exceeded(session.elapsed()));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_clock_not_tick_count() {
        let mut guard = guard();
        let _timers = armed(&mut guard);
        let mut session = CallSession::default();
        session.reduce(StateDelta::ElapsedAdvanced(Duration::from_secs(1)));

        // Several ticks were lost to a stall; one tick must catch up fully
        tokio::time::advance(Duration::from_secs(7)).await;
        let deltas = guard.on_tick(&session);

        assert_eq!(deltas[0], StateDelta::ElapsedAdvanced(Duration::from_secs(6)));
        for delta in deltas {
            session.reduce(delta);
        }
        assert_eq!(session.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn unarmed_guard_reports_nothing() {
        let guard = guard();
        assert!(guard.on_tick(&CallSession::default()).is_empty());
    }

    #[test]
    fn not_exceeded_before_max() {
        let guard = guard();
        assert!(!guard.exceeded(Duration::from_secs(4)));
        assert!(guard.exceeded(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn armed_guard_ticks_then_hits_max() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut timers = TimerSet::new(tx);
        let mut guard = guard();
        guard.arm(&mut timers);
        assert_eq!(timers.active(), 2);

        let mut ticks = 0;
        loop {
            match rx.recv().await {
                Some(CallEvent::Tick) => ticks += 1,
                Some(CallEvent::MaxDurationReached) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        // tick and max share the 5s instant; either order is fine
        assert!(ticks == 4 || ticks == 5, "ticks = {}", ticks);

        timers.invalidate_all();
        assert_eq!(timers.active(), 0);
    }
}
