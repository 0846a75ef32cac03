use std::fmt;

/// Crate-wide result alias.
pub type ReelResult<T> = Result<T, ReelError>;

/// Why a recording session was terminated abnormally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StopReason {
    /// The session exceeded its safety window.
    Timeout,
    /// A setup, tick, or recorder failure was routed through the guard.
    Error,
}

impl StopReason {
    /// Stable reason code surfaced to callers (`"TIMEOUT"` / `"ERROR"`).
    pub fn code(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors produced by design loading, rendering, and recording.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("setup error: {0}")]
    Setup(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("a recording is already being generated")]
    AlreadyGenerating,

    #[error("recording force-stopped: {0}")]
    ForceStopped(StopReason),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn recorder(msg: impl Into<String>) -> Self {
        Self::Recorder(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return the force-stop reason when this error ended a session abnormally.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::ForceStopped(reason) => Some(*reason),
            _ => None,
        }
    }
}
