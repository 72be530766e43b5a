//! Session management
//!
//! A [`SerialSession`] owns everything one device link needs: the connector,
//! the open link, the reader task feeding the [`ResponseBus`], and the lock
//! that keeps commands one at a time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    classify, Connector, LineFramer, ProtocolError, ResponseBus, SerialConnector,
    DEFAULT_BAUD_RATE, DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_LINE_LEN,
    DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS, READ_CHUNK_SIZE,
};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Baud rate used by [`SerialSession::serial`]
    pub baud_rate: u32,
    /// Time to wait for a response after a command was flushed
    pub response_timeout_ms: u64,
    /// Time allowed to write and flush one command line
    pub write_timeout_ms: u64,
    /// Time allowed for the connector to open the link
    pub open_timeout_ms: u64,
    /// Time allowed for the reader task to stop on close
    pub close_timeout_ms: u64,
    /// Send attempts per command
    pub max_attempts: u32,
    /// Longest line the reader buffers; longer lines are discarded
    pub max_line_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl SessionConfig {
    /// Response timeout as a [`Duration`]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Write timeout as a [`Duration`]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Open timeout as a [`Duration`]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Close timeout as a [`Duration`]
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Result of [`SerialSession::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenStatus {
    /// A new link was opened
    Opened,
    /// The requested target was already open; nothing changed
    AlreadyOpen,
}

/// Result of [`SerialSession::close`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseStatus {
    /// An open link was closed
    Closed,
    /// There was no live link to close
    AlreadyClosed,
}

/// Snapshot of session traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Bytes written to the link
    pub tx_bytes: u64,
    /// Bytes read from the link
    pub rx_bytes: u64,
    /// Complete lines framed from the link
    pub lines_received: u64,
    /// Lines that were not command responses
    pub lines_ignored: u64,
    /// Responses handed to a waiting command
    pub outcomes_delivered: u64,
    /// Responses that arrived with no command waiting
    pub outcomes_dropped: u64,
}

#[derive(Debug, Default)]
pub(super) struct LinkCounters {
    pub(super) tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    lines_received: AtomicU64,
    lines_ignored: AtomicU64,
}

/// A live link: the write half plus the task draining the read half
pub(super) struct OpenLink<L> {
    /// Generation id, unique per session
    pub(super) id: u64,
    pub(super) target: String,
    pub(super) writer: WriteHalf<L>,
    reader: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl<L> OpenLink<L> {
    /// The link is usable until it is shut down or the reader sees EOF or an error
    pub(super) fn is_alive(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.reader.is_finished()
    }
}

impl<L> Drop for OpenLink<L> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One device link and its protocol state
pub struct SerialSession<C: Connector> {
    connector: C,
    config: SessionConfig,
    pub(super) link: Mutex<Option<OpenLink<C::Link>>>,
    pub(super) bus: Arc<ResponseBus>,
    pub(super) command_lock: Mutex<()>,
    pub(super) counters: Arc<LinkCounters>,
    next_link: AtomicU64,
}

impl SerialSession<SerialConnector> {
    /// Create a session over real serial ports
    pub fn serial(config: SessionConfig) -> Self {
        Self::new(SerialConnector::new(config.baud_rate), config)
    }
}

impl<C: Connector> SerialSession<C> {
    /// Create a session (not yet connected)
    pub fn new(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            link: Mutex::new(None),
            bus: Arc::new(ResponseBus::new()),
            command_lock: Mutex::new(()),
            counters: Arc::new(LinkCounters::default()),
            next_link: AtomicU64::new(0),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bus classified responses are published on
    pub fn bus(&self) -> &ResponseBus {
        &self.bus
    }

    /// Open a link to `target`.
    ///
    /// If the same target is already open this is a no-op. If a different
    /// target is open it is closed first.
    pub async fn open(&self, target: &str) -> Result<OpenStatus, ProtocolError> {
        let mut link = self.link.lock().await;

        if let Some(current) = link.as_ref().filter(|current| current.is_alive()) {
            if current.target == target {
                info!(port = target, "already opened");
                return Ok(OpenStatus::AlreadyOpen);
            }
            warn!(
                current = %current.target,
                requested = target,
                "switching to another port"
            );
        }
        if let Some(previous) = link.take() {
            self.shutdown_link(previous).await;
        }

        let connect = self.connector.connect(target);
        let stream = tokio::time::timeout(self.config.open_timeout(), connect)
            .await
            .map_err(|_| {
                warn!(port = target, "timed out opening link");
                ProtocolError::OpenTimeout
            })??;

        let id = self.next_link.fetch_add(1, Ordering::Relaxed);
        let (read_half, writer) = tokio::io::split(stream);
        let shutdown = CancellationToken::new();
        let reader = tokio::spawn(pump_lines(
            read_half,
            LinkReader {
                id,
                bus: Arc::clone(&self.bus),
                counters: Arc::clone(&self.counters),
                framer: LineFramer::with_max_line_len(self.config.max_line_len),
            },
            shutdown.clone(),
        ));

        *link = Some(OpenLink {
            id,
            target: target.to_string(),
            writer,
            reader,
            shutdown,
        });
        info!(port = target, link = id, "link opened");
        Ok(OpenStatus::Opened)
    }

    /// Close the link, waking any command waiting on it
    pub async fn close(&self) -> CloseStatus {
        let mut link = self.link.lock().await;
        match link.take() {
            Some(open) => {
                let was_alive = open.is_alive();
                self.shutdown_link(open).await;
                if was_alive {
                    CloseStatus::Closed
                } else {
                    CloseStatus::AlreadyClosed
                }
            }
            None => {
                info!("already closed");
                CloseStatus::AlreadyClosed
            }
        }
    }

    async fn shutdown_link(&self, mut open: OpenLink<C::Link>) {
        open.shutdown.cancel();
        self.bus.cancel_link(open.id);
        if tokio::time::timeout(self.config.close_timeout(), &mut open.reader)
            .await
            .is_err()
        {
            warn!(port = %open.target, "reader did not stop in time, aborting");
            open.reader.abort();
        }
        info!(port = %open.target, "link closed");
    }

    /// Check if a live link is open
    pub async fn is_open(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|open| open.is_alive())
    }

    /// Name of the currently open target, if any
    pub async fn target(&self) -> Option<String> {
        self.link
            .lock()
            .await
            .as_ref()
            .filter(|open| open.is_alive())
            .map(|open| open.target.clone())
    }

    /// Traffic counters since the session was created
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            tx_bytes: self.counters.tx_bytes.load(Ordering::Relaxed),
            rx_bytes: self.counters.rx_bytes.load(Ordering::Relaxed),
            lines_received: self.counters.lines_received.load(Ordering::Relaxed),
            lines_ignored: self.counters.lines_ignored.load(Ordering::Relaxed),
            outcomes_delivered: self.bus.delivered_count(),
            outcomes_dropped: self.bus.dropped_count(),
        }
    }
}

/// State owned by the reader task of one link
struct LinkReader {
    id: u64,
    bus: Arc<ResponseBus>,
    counters: Arc<LinkCounters>,
    framer: LineFramer,
}

/// Reader task: bytes -> lines -> outcomes -> bus
async fn pump_lines<R>(mut reader: R, state: LinkReader, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let LinkReader {
        id,
        bus,
        counters,
        mut framer,
    } = state;
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("reader stopped");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    warn!("link closed by peer");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "link read failed");
                    break;
                }
            },
        };

        counters.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
        for line in framer.feed(&buf[..n]) {
            counters.lines_received.fetch_add(1, Ordering::Relaxed);
            trace!(%line, "rx line");
            match classify(&line) {
                Some(outcome) => {
                    debug!(?outcome, "response line");
                    bus.publish(outcome);
                }
                None => {
                    counters.lines_ignored.fetch_add(1, Ordering::Relaxed);
                    debug!(%line, "not a response, ignoring");
                }
            }
        }
    }

    if let Some(fragment) = framer.finish() {
        debug!(%fragment, "discarding unterminated fragment");
    }
    // Mark the link dead before waking the waiter so its retry sees it closed
    shutdown.cancel();
    bus.cancel_link(id);
}
