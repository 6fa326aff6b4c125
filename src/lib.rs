pub mod audio;
pub mod config;
pub mod error;
pub mod kernel;
pub mod services;
pub mod speech;

// Re-export the call surface for convenient access
pub use config::CallConfig;
pub use error::{CallError, CallResult};
pub use kernel::orchestrator::{CallHandle, CallReport, Collaborators, TurnOrchestrator};
pub use kernel::state::{CallSnapshot, CallState, EndReason};
