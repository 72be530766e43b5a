//! Transport abstraction
//!
//! The session does not care what carries the bytes. A [`Connector`] opens a
//! duplex byte stream to a named target. The session splits that stream into a
//! read half, driven by the reader task, and a write half, used by the command
//! executor.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use super::ProtocolError;

/// Opens links to a device
pub trait Connector: Send + Sync + 'static {
    /// The duplex byte stream produced by a successful connect
    type Link: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a link to `target` (a port name for serial links)
    fn connect(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Self::Link, ProtocolError>> + Send;
}
