use crate::error::CallResult;
use async_trait::async_trait;

/// Which side of the shared audio device is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioMode {
    Record,
    Playback,
}

/// The platform audio session shared by capture and playback.
///
/// The orchestrator switches the mode at every Listening/Speaking boundary and
/// never has capture and playback active at once.
#[async_trait]
pub trait AudioRoute: Send + Sync {
    /// Ask for microphone and speaker access. Failure here refuses the call.
    async fn request_permissions(&self) -> CallResult<()>;

    fn set_mode(&self, mode: AudioMode) -> CallResult<()>;

    /// Give the device back to the platform when the call ends.
    fn release(&self);
}
