use thiserror::Error;

/// Errors that can occur while hooking and forwarding captured audio.
///
/// Configuration and negotiation errors leave prior stream state untouched.
/// `Busy` is an expected load-shedding outcome, not a session failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("target sink not bound")]
    SinkNotBound,

    #[error("target sink already bound")]
    AlreadyBound,

    #[error("unsupported sample format 0x{0:02x}")]
    UnsupportedFormat(i32),

    #[error("unsupported access layout 0x{0:02x}")]
    UnsupportedLayout(i32),

    #[error("incompatible layout: {0}")]
    IncompatibleLayout(String),

    #[error("stream not initialized")]
    StreamNotInitialized,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("capture worker busy, buffer dropped")]
    Busy,

    #[error("failed to grow capture buffer to {requested} bytes")]
    AllocationFailure { requested: usize },

    #[error("channel write failed: {0}")]
    ChannelWrite(String),

    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("invalid channel area: {0}")]
    InvalidArea(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("configuration failed: {0}")]
    Configuration(String),

    #[error("failed to spawn capture worker: {0}")]
    WorkerSpawn(String),

    #[error("capture worker exited")]
    WorkerExited,

    #[error("storage error: {0}")]
    Storage(String),
}

impl HookError {
    /// Whether this error only sheds the current buffer and leaves the
    /// stream fully usable for the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Busy | Self::AllocationFailure { .. } | Self::ChannelWrite(_)
        )
    }
}
