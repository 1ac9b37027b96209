//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// A frame payload or command parameter the protocol cannot carry
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Discovery finished without a matching printer answering
    #[error("The printer was not found: {0}")]
    DeviceNotFound(String),

    /// The printer signalled XOff and did not clear it in time
    #[error("Printer data overrun: {0}")]
    TransportOverrun(String),

    /// Input could not be turned into pixels (file type, image or font)
    #[error("Decode failure: {0}")]
    Decode(String),

    /// Writing to the link failed or the link is gone
    #[error("Link failure: {0}")]
    Link(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrintError {
    /// True for errors raised before anything was queued for the printer.
    pub fn is_decode(&self) -> bool {
        matches!(self, PrintError::Decode(_) | PrintError::Image(_))
    }
}

impl From<btleplug::Error> for PrintError {
    /// Radio and adapter failures are link failures.
    fn from(err: btleplug::Error) -> Self {
        PrintError::Link(format!("Bluetooth: {err}"))
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
