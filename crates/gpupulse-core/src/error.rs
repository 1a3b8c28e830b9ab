use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("device {index} unavailable: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    #[error("hardware interface init failed: {0}")]
    InitFailure(String),

    #[error("failed to parse interface output: {0}")]
    Parse(String),
}

impl TelemetryError {
    /// Wrap any reader-level failure as an unreachable-device error.
    pub fn unreachable(index: u32, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
