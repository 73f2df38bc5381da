use thiserror::Error;

/// Why a run stopped before completing all transients.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("emergency stop (light gate interrupted)")]
    EmergencyStop,
    #[error("stall detected")]
    StallDetected,
    #[error("cancelled by user")]
    UserCancelled,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShuttleError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("device communication error: {0}")]
    DeviceCommunication(String),
    #[error("aborted: {0}")]
    Abort(AbortReason),
    #[error("invalid ramp expression: {0}")]
    InvalidRampExpression(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing motor")]
    MissingMotor,
    #[error("missing run plan")]
    MissingPlan,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
