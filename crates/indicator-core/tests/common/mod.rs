//! Shared harness: an in-memory connector and a scriptable fake device

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use indicator_core::protocol::{Connector, ProtocolError, SerialSession, SessionConfig};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connector handing out in-memory links; the device ends go to the test
pub struct DuplexConnector {
    devices: mpsc::UnboundedSender<(String, FakeDevice)>,
}

impl DuplexConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, FakeDevice)>) {
        let (devices, rx) = mpsc::unbounded_channel();
        (Self { devices }, rx)
    }
}

impl Connector for DuplexConnector {
    type Link = DuplexStream;

    async fn connect(&self, target: &str) -> Result<DuplexStream, ProtocolError> {
        let (host, device) = tokio::io::duplex(1024);
        self.devices
            .send((target.to_string(), FakeDevice::new(device)))
            .map_err(|_| ProtocolError::ConnectionFailed("harness dropped".to_string()))?;
        Ok(host)
    }
}

/// Device end of an in-memory link
pub struct FakeDevice {
    io: BufReader<DuplexStream>,
}

impl FakeDevice {
    fn new(stream: DuplexStream) -> Self {
        Self {
            io: BufReader::new(stream),
        }
    }

    /// Next command line without its terminator, `None` once the host hangs up
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.io.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
        }
    }

    /// Whether the host sends another line within `window`
    pub async fn stays_quiet(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.recv_line()).await.is_err()
    }

    pub async fn send(&mut self, text: &str) {
        self.io.write_all(text.as_bytes()).await.unwrap();
        self.io.flush().await.unwrap();
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        response_timeout_ms: 100,
        ..SessionConfig::default()
    }
}

/// Open a session on target "dev0" and return it with the device end
pub async fn open_session(
    config: SessionConfig,
) -> (
    Arc<SerialSession<DuplexConnector>>,
    FakeDevice,
    mpsc::UnboundedReceiver<(String, FakeDevice)>,
) {
    init_tracing();
    let (connector, mut devices) = DuplexConnector::new();
    let session = Arc::new(SerialSession::new(connector, config));
    session.open("dev0").await.unwrap();
    let (_, device) = devices.recv().await.unwrap();
    (session, device, devices)
}

/// Connector whose open never completes
pub struct HangingConnector;

impl Connector for HangingConnector {
    type Link = DuplexStream;

    async fn connect(&self, _target: &str) -> Result<DuplexStream, ProtocolError> {
        std::future::pending().await
    }
}

/// How a [`FaultyLink`] misbehaves on write
#[derive(Clone, Copy)]
pub enum WriteFault {
    /// Every write fails immediately
    Broken,
    /// Writes never complete
    Stalled,
}

/// Link that never delivers data and fails or stalls on write
pub struct FaultyLink(WriteFault);

impl AsyncRead for FaultyLink {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for FaultyLink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.0 {
            WriteFault::Broken => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
            WriteFault::Stalled => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub struct FaultyConnector(pub WriteFault);

impl Connector for FaultyConnector {
    type Link = FaultyLink;

    async fn connect(&self, _target: &str) -> Result<FaultyLink, ProtocolError> {
        Ok(FaultyLink(self.0))
    }
}

#[derive(Default)]
struct StallState {
    written: Vec<u8>,
    /// Bytes accepted before writes stall, `None` once released
    budget: Option<usize>,
    waker: Option<Waker>,
}

/// Handle on a [`StallingLink`]: inspect what reached the wire and unstall it
#[derive(Clone, Default)]
pub struct StallControl(Arc<Mutex<StallState>>);

impl StallControl {
    /// Accept `budget` more bytes, then stall every write
    pub fn stall_after(&self, budget: usize) {
        self.0.lock().unwrap().budget = Some(budget);
    }

    /// Let writes through again
    pub fn release(&self) {
        let mut state = self.0.lock().unwrap();
        state.budget = None;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.lock().unwrap().written.clone()
    }
}

/// Link that records writes and can stall partway through a line; reads never complete
pub struct StallingLink(StallControl);

impl AsyncRead for StallingLink {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for StallingLink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.0 .0.lock().unwrap();
        let n = match state.budget {
            None => buf.len(),
            Some(0) => {
                state.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            Some(budget) => {
                let n = budget.min(buf.len());
                state.budget = Some(budget - n);
                n
            }
        };
        state.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub struct StallingConnector(pub StallControl);

impl Connector for StallingConnector {
    type Link = StallingLink;

    async fn connect(&self, _target: &str) -> Result<StallingLink, ProtocolError> {
        Ok(StallingLink(self.0.clone()))
    }
}
