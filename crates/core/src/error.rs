/// Result alias that carries the custom [`EdrumError`] type.
pub type Result<T> = std::result::Result<T, EdrumError>;

/// Common error type for the core crate.
///
/// Nothing in the trigger loop treats these as fatal. Decoders and validators
/// return them so the caller can decide to drop, clamp or ignore.
#[derive(Debug, thiserror::Error)]
pub enum EdrumError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// An inbound frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A pad configuration breaks one of its invariants.
    #[error("invalid pad properties: {0}")]
    InvalidProperties(String),
    /// The kit configuration cannot be used.
    #[error("invalid kit configuration: {0}")]
    InvalidConfig(String),
    /// A storage address fell outside the device.
    #[error("storage address {address} is outside capacity {capacity}")]
    StorageRange { address: usize, capacity: usize },
    /// A persisted record failed its version or checksum check.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: usize, reason: &'static str },
    #[error("unknown pad {0}")]
    UnknownPad(u8),
    #[error("unknown curve {0}")]
    UnknownCurve(u8),
    #[error("unknown pad type {0}")]
    UnknownType(u8),
}

impl EdrumError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn properties<T: Into<String>>(msg: T) -> Self {
        Self::InvalidProperties(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for EdrumError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for EdrumError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Reasons an inbound frame is rejected by the codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is too short")]
    TooShort,
    #[error("frame does not begin with 0xF0")]
    MissingStart,
    #[error("frame does not end with 0xF7")]
    MissingEnd,
    #[error("frame carries vendor {0:#04x}")]
    WrongVendor(u8),
    #[error("unknown command {0}")]
    UnknownCommand(u8),
    #[error("payload byte {index} has the high bit set")]
    NotSevenBit { index: usize },
    #[error("payload ended while reading {field}")]
    Truncated { field: &'static str },
}
