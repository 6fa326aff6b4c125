pub mod duration;
pub mod event;
pub mod orchestrator;
pub mod state;
pub mod telemetry;
pub mod timer;

pub use duration::DurationGuard;
pub use event::{CallEvent, TurnId};
pub use orchestrator::{CallHandle, CallReport, Collaborators, TurnOrchestrator};
pub use state::{CallSession, CallSnapshot, CallState, EndReason, StateDelta};
pub use timer::{TimerKind, TimerSet};
