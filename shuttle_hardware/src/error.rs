use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial port error: {0}")]
    Serial(String),
    #[error("no serial port matches '{0}'")]
    PortNotFound(String),
    #[error("motor reply timeout")]
    Timeout,
    #[error("reply checksum mismatch (expected {expected:#04x}, got {got:#04x})")]
    Checksum { expected: u8, got: u8 },
    #[error("module rejected command {command}: status {status} ({text})")]
    Status {
        command: u8,
        status: u8,
        text: &'static str,
    },
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("connection closed")]
    Closed,
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
