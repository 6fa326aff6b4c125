use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Tick,
    MaxDuration,
}

/// Owns every call-level timer. A timer's only effect is sending an event
/// into the orchestrator queue; it never touches session state.
#[derive(Debug)]
pub struct TimerSet<E> {
    timers: HashMap<TimerKind, JoinHandle<()>>,
    tx: mpsc::Sender<E>,
}

impl<E> TimerSet<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self {
            timers: HashMap::new(),
            tx,
        }
    }

    /// Fire `event` once after `after`. Replaces any timer of the same kind.
    pub fn once(&mut self, kind: TimerKind, after: Duration, event: E) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            sleep(after).await;
            debug!("timer {:?} fired", kind);
            let _ = tx.send(event).await;
        });
        self.install(kind, handle);
    }

    /// Fire `event` every `period`, first fire one period from now.
    pub fn every(&mut self, kind: TimerKind, period: Duration, event: E) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut cadence = interval_at(Instant::now() + period, period);
            cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                cadence.tick().await;
                if tx.send(event.clone()).await.is_err() {
                    break;
                }
            }
        });
        self.install(kind, handle);
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.timers.remove(&kind) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every timer. Returns how many were still pending.
    pub fn invalidate_all(&mut self) -> usize {
        let mut pending = 0;
        for (kind, handle) in self.timers.drain() {
            if !handle.is_finished() {
                pending += 1;
            }
            handle.abort();
            debug!("timer {:?} invalidated", kind);
        }
        pending
    }

    /// Number of timers that can still fire.
    pub fn active(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }

    fn install(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        if let Some(previous) = self.timers.insert(kind, handle) {
            previous.abort();
        }
    }
}

impl<E> Drop for TimerSet<E> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
