//! Call configuration: timing windows and the reasoning-service endpoint.

use crate::error::{CallError, CallResult};
use std::time::Duration;

pub const GREETING_SENTINEL: &str = "__greeting__";
pub const CALL_SOURCE: &str = "voice_call";

/// Configuration for one call.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Gap after the last partial transcript that ends an utterance (default: 2s)
    pub silence_window: Duration,

    /// Window with no speech at all before the turn is finalized empty (default: 30s)
    pub absolute_timeout: Duration,

    /// Call clock resolution (default: 1s)
    pub tick_interval: Duration,

    /// Soft warning threshold (default: 12min)
    pub warning_threshold: Duration,

    /// Hard call limit (default: 15min)
    pub max_duration: Duration,

    /// Pause used in place of audio when synthesis fails (default: 1.5s)
    pub synthesis_fallback_delay: Duration,

    pub greeting_sentinel: String,

    /// Spoken when the reasoning service is unreachable or rejects the request
    pub fallback_reply: String,

    /// Spoken when a turn ends with nothing intelligible
    pub reprompt_reply: String,

    /// Full URL of the reasoning-service voice endpoint
    pub service_url: String,

    /// Bearer token for the reasoning service
    pub service_token: Option<String>,

    pub request_timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            silence_window: Duration::from_secs(2),
            absolute_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            warning_threshold: Duration::from_secs(12 * 60),
            max_duration: Duration::from_secs(15 * 60),
            synthesis_fallback_delay: Duration::from_millis(1500),
            greeting_sentinel: GREETING_SENTINEL.to_string(),
            fallback_reply: "Sorry, I'm having trouble hearing my thoughts right now. Can you say that again?"
                .to_string(),
            reprompt_reply: "I didn't catch that. Could you repeat?".to_string(),
            service_url: "http://localhost:8080/api/voice".to_string(),
            service_token: None,
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl CallConfig {
    /// Defaults overlaid with `VOICECALL_*` environment variables.
    pub fn from_env() -> CallResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup` (used by tests).
    pub fn from_lookup<F>(lookup: F) -> CallResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = read_u64(&lookup, "VOICECALL_SILENCE_MS")? {
            config.silence_window = Duration::from_millis(ms);
        }
        if let Some(secs) = read_u64(&lookup, "VOICECALL_ABSOLUTE_TIMEOUT_SECS")? {
            config.absolute_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64(&lookup, "VOICECALL_WARNING_SECS")? {
            config.warning_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64(&lookup, "VOICECALL_MAX_DURATION_SECS")? {
            config.max_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64(&lookup, "VOICECALL_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = lookup("VOICECALL_SERVICE_URL") {
            config.service_url = url.trim().to_string();
        }
        config.service_token = lookup("VOICECALL_SERVICE_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CallResult<()> {
        let windows = [
            ("silence_window", self.silence_window),
            ("absolute_timeout", self.absolute_timeout),
            ("tick_interval", self.tick_interval),
            ("max_duration", self.max_duration),
        ];
        for (name, value) in windows {
            if value.is_zero() {
                return Err(CallError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.warning_threshold >= self.max_duration {
            return Err(CallError::Config(format!(
                "warning_threshold ({:?}) must be below max_duration ({:?})",
                self.warning_threshold, self.max_duration
            )));
        }
        if self.service_url.is_empty() {
            return Err(CallError::Config("service_url is empty".to_string()));
        }
        Ok(())
    }
}

fn read_u64<F>(lookup: &F, key: &str) -> CallResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| CallError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}
