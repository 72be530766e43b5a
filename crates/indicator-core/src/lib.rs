//! # Indicator Core Library
//!
//! Core functionality for configuring Indicator IoTeX devices over a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Line framing and classification of the device's `CMD_RESP` protocol
//! - A serialized, retrying command executor over any async byte link
//! - Serial port discovery and a tokio-serial link
//! - Device identity and provisioning flows
//!
//! ## Example
//!
//! ```rust,ignore
//! use indicator_core::{device, protocol::{SerialSession, SessionConfig}};
//!
//! let session = SerialSession::serial(SessionConfig::default());
//! session.open("/dev/ttyUSB0").await?;
//!
//! let info = device::read_device_info(&session).await?;
//! println!("MAC: {}", info.mac);
//! ```

pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{read_device_info, write_provisioning, DeviceInfo, Provisioning};
    pub use crate::protocol::{
        classify, CommandOptions, LineFramer, ProtocolError, ResponseBus, ResponseOutcome,
        SerialSession, SessionConfig,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
