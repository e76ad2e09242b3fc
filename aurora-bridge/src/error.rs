use thiserror::Error;

/// A single inverter transaction failed. Never fatal: callers substitute a
/// missing value and carry on with the rest of their batch.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no response: {0}")]
    NoResponse(#[from] std::io::Error),
    #[error("reply checksum mismatch (expected {expected:#06x}, got {actual:#06x})")]
    Checksum { expected: u16, actual: u16 },
    #[error("{transmission} ({code}), {global}")]
    Transaction {
        code: u8,
        transmission: &'static str,
        global: &'static str,
    },
    #[error("epoch {0} is outside the inverter clock range")]
    ClockRange(u64),
}

/// A payload did not fit the buffer reserved for it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("{what} exceeds {capacity} bytes")]
    Overflow { what: &'static str, capacity: usize },
    #[error("timestamp {0} cannot be represented as a calendar date")]
    Timestamp(u64),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Delivery to the cloud report endpoint failed and should be retried.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// A connection attempt for one of the links could not be started.
#[derive(Debug, Error)]
#[error("{link} connect failed: {reason}")]
pub struct ConnectError {
    pub link: &'static str,
    pub reason: String,
}
