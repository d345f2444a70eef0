use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::HookError;

/// How a non-blocking (signal-context) producer hands buffers to its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncHandoff {
    /// Never wait for the worker's slot-empty acknowledgement. The producer
    /// only polls the readiness flag, so a buffer staged between the
    /// worker's wake-up signal and its pick-up can be replaced by the next
    /// one and never emitted.
    #[default]
    Unsynchronized,

    /// Also require the slot-empty permit, taken without blocking. Staged
    /// buffers are never replaced, but the producer spins (or drops under
    /// skip-on-busy) for the whole drain.
    Acknowledged,
}

/// What an mmap commit does on a stream with zero channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroChannelCommit {
    /// Silently accept the empty commit.
    #[default]
    Ignore,
    /// Fail with `ProtocolViolation`.
    Reject,
}

/// Configuration for an audio hook session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfiguration {
    /// Initial skip-on-busy state (default: false).
    pub skip_on_busy: bool,

    /// Handoff policy for non-blocking streams (default: unsynchronized).
    pub async_handoff: AsyncHandoff,

    /// Behavior of commits on zero-channel streams (default: ignore).
    pub zero_channel_commit: ZeroChannelCommit,

    /// Hardware periods to preallocate in each stream's capture buffer
    /// when it is initialized (default: 2). Valid range: 0..=64.
    pub preallocate_periods: u32,

    /// Prefix of capture worker thread names (default: "audio-hook").
    pub thread_name_prefix: String,
}

impl HookConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread name prefix must not be empty".into());
        }
        if self.preallocate_periods > 64 {
            return Err(format!(
                "preallocate_periods out of range: {}",
                self.preallocate_periods
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, HookError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HookError::Configuration(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(HookError::Configuration)?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, HookError> {
        let json = fs::read_to_string(path)
            .map_err(|e| HookError::Configuration(format!("failed to read config: {}", e)))?;
        Self::from_json_str(&json)
    }
}

impl Default for HookConfiguration {
    fn default() -> Self {
        Self {
            skip_on_busy: false,
            async_handoff: AsyncHandoff::Unsynchronized,
            zero_channel_commit: ZeroChannelCommit::Ignore,
            preallocate_periods: 2,
            thread_name_prefix: "audio-hook".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HookConfiguration::default();
        assert!(config.validate().is_ok());
        assert!(!config.skip_on_busy);
        assert_eq!(config.async_handoff, AsyncHandoff::Unsynchronized);
        assert_eq!(config.zero_channel_commit, ZeroChannelCommit::Ignore);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            HookConfiguration::from_json_str(r#"{ "skip_on_busy": true, "async_handoff": "acknowledged" }"#)
                .unwrap();
        assert!(config.skip_on_busy);
        assert_eq!(config.async_handoff, AsyncHandoff::Acknowledged);
        assert_eq!(config.preallocate_periods, 2);
        assert_eq!(config.thread_name_prefix, "audio-hook");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = HookConfiguration::from_json_str(r#"{ "thread_name_prefix": "  " }"#).unwrap_err();
        assert!(matches!(err, HookError::Configuration(_)));

        let err = HookConfiguration::from_json_str(r#"{ "preallocate_periods": 65 }"#).unwrap_err();
        assert!(matches!(err, HookError::Configuration(_)));

        let err = HookConfiguration::from_json_str("not json").unwrap_err();
        assert!(matches!(err, HookError::Configuration(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.json");
        fs::write(&path, r#"{ "zero_channel_commit": "reject" }"#).unwrap();

        let config = HookConfiguration::from_json_file(&path).unwrap();
        assert_eq!(config.zero_channel_commit, ZeroChannelCommit::Reject);

        let missing = HookConfiguration::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(HookError::Configuration(_))));
    }
}
