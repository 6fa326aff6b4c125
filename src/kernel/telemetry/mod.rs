//! Call telemetry.
//!
//! # PRIVACY INVARIANT
//! Telemetry events must **NEVER** contain user content (transcripts, replies,
//! action payloads). Only states, kinds, counts and durations are allowed.
//!
//! Telemetry is write-only from the orchestrator's point of view: no decision
//! in the turn cycle reads it.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{CallTelemetryEvent, FallbackKind, TurnKind};
pub use metrics::CallMetrics;
pub use recorder::TelemetryRecorder;
