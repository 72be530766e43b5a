//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to device")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out opening the link")]
    OpenTimeout,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Write timed out before the link flushed")]
    WriteTimeout,

    #[error("'{command}' failed after {attempts} attempt(s)")]
    ExhaustedRetries { command: String, attempts: u32 },

    #[error("Another command is already waiting for a response")]
    WaiterBusy,

    #[error("Device returned error: {0}")]
    DeviceError(String),

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the error was caused by the link being unavailable
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::NotConnected
                | ProtocolError::ConnectionFailed(_)
                | ProtocolError::OpenTimeout
                | ProtocolError::PortNotFound(_)
                | ProtocolError::SerialError(_)
        )
    }
}
