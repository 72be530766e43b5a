//! Serial Protocol Communication
//!
//! Implements the line-oriented `CMD_RESP` protocol spoken by Indicator devices.
//!
//! Bytes from the link are split into lines by the [`LineFramer`], each line is
//! run through [`classify`], and matched outcomes are handed to the single
//! pending command through the [`ResponseBus`]. [`SerialSession`] ties these
//! together and serializes command execution.

pub mod bus;
pub mod classifier;
pub mod commands;
mod error;
mod executor;
pub mod framer;
pub mod serial;
mod session;
pub mod transport;

pub use bus::{ResponseBus, Waiter};
pub use classifier::{classify, ResponseOutcome};
pub use commands::DeviceCommand;
pub use error::ProtocolError;
pub use executor::CommandOptions;
pub use framer::{LineFramer, Lines};
pub use serial::{list_ports, PortInfo, SerialConnector};
pub use session::{CloseStatus, OpenStatus, SerialSession, SessionConfig, SessionStats};
pub use transport::Connector;

/// Default baud rate for the device console
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default time to wait for a `CMD_RESP` line after a command was flushed
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default budget for writing and flushing one command line
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 250;

/// Default budget for opening the link
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5000;

/// Default budget for stopping the reader when closing the link
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 1000;

/// Default number of send attempts per command
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default cap on one buffered line; device responses are far shorter
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Read buffer size for the link reader task
pub const READ_CHUNK_SIZE: usize = 1024;
