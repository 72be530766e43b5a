//! Command execution
//!
//! Sends one command line, waits for the next classified response and retries
//! on silence. Commands on a session never overlap: each call holds the
//! session's command lock from first write to final outcome.
//!
//! The response slot is armed while the link lock is held, right before the
//! write, and is bound to that link. Reopening the session onto another port
//! therefore cannot cancel a command that has not been written yet.
//!
//! A write that times out may have put part of the line on the wire. The next
//! attempt first sends a bare CR+LF so the device drops that fragment as its
//! own line instead of prefixing it to the retried command.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{
    Connector, DeviceCommand, ProtocolError, ResponseOutcome, SerialSession, SessionConfig, Waiter,
};

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Per-call execution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Time to wait for a response after each flushed write
    pub response_timeout: Duration,
    /// Time allowed to write and flush the command line
    pub write_timeout: Duration,
    /// Total send attempts before giving up
    pub max_attempts: u32,
}

impl CommandOptions {
    /// Override the response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the attempt bound
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

impl From<&SessionConfig> for CommandOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            response_timeout: config.response_timeout(),
            write_timeout: config.write_timeout(),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Append CR+LF unless the caller already terminated the line
fn terminate_line(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{}\r\n", command)
    }
}

fn write_failed(e: std::io::Error) -> ProtocolError {
    ProtocolError::WriteFailed(e.to_string())
}

impl<C: Connector> SerialSession<C> {
    /// Execution settings derived from the session configuration
    pub fn command_options(&self) -> CommandOptions {
        CommandOptions::from(self.config())
    }

    /// Send `command` and return the first response the device gives.
    ///
    /// Uses the session's attempt bound and write timeout with the given
    /// response timeout.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ResponseOutcome, ProtocolError> {
        let options = self.command_options().with_response_timeout(timeout);
        self.execute_with(command, options).await
    }

    /// Execute a typed device command with its own timeout
    pub async fn execute_command(
        &self,
        command: &DeviceCommand,
    ) -> Result<ResponseOutcome, ProtocolError> {
        self.execute(&command.to_line(), command.timeout()).await
    }

    /// Send `command` and return the first response the device gives.
    ///
    /// Any response ends the call, including `CMD_RESP:ERR`; only silence and
    /// writes that fail to flush in time are retried. Fails with
    /// [`ProtocolError::NotConnected`] if the session is closed at the first
    /// attempt, and with [`ProtocolError::ExhaustedRetries`] once the attempts
    /// are used up or the link goes away between attempts. A zero attempt
    /// bound is rejected with [`ProtocolError::InvalidArgument`].
    pub async fn execute_with(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<ResponseOutcome, ProtocolError> {
        if options.max_attempts == 0 {
            return Err(ProtocolError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let line = terminate_line(command);
        let label = command.trim_end();

        let _turn = self.command_lock.lock().await;
        let mut sent = 0;
        let mut resync = false;

        for attempt in 1..=options.max_attempts {
            let waiter = match self
                .send_line(label, line.as_bytes(), resync, options.write_timeout)
                .await
            {
                Ok(waiter) => {
                    sent += 1;
                    resync = false;
                    waiter
                }
                Err(ProtocolError::NotConnected) if attempt > 1 => {
                    warn!(command = label, attempt, "link went away, giving up");
                    break;
                }
                Err(ProtocolError::WriteTimeout) => {
                    sent += 1;
                    resync = true;
                    warn!(command = label, attempt, "write did not flush in time");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let deadline = Instant::now() + options.response_timeout;
            match waiter.wait(deadline).await {
                Some(outcome) => {
                    debug!(command = label, attempt, ?outcome, "command resolved");
                    return Ok(outcome);
                }
                None => warn!(
                    command = label,
                    attempt,
                    timeout_ms = options.response_timeout.as_millis() as u64,
                    "no response"
                ),
            }
        }

        Err(ProtocolError::ExhaustedRetries {
            command: label.to_string(),
            attempts: sent,
        })
    }

    /// Arm the response slot for `label` and write one line on the open link.
    ///
    /// With `resync` set, a bare line terminator goes out first to flush any
    /// fragment a timed-out write left on the device.
    async fn send_line(
        &self,
        label: &str,
        line: &[u8],
        resync: bool,
        write_timeout: Duration,
    ) -> Result<Waiter<'_>, ProtocolError> {
        let mut link = self.link.lock().await;
        let open = link
            .as_mut()
            .filter(|open| open.is_alive())
            .ok_or(ProtocolError::NotConnected)?;
        let link_id = open.id;
        let mut written = 0;

        let write = async {
            if resync {
                open.writer
                    .write_all(LINE_TERMINATOR)
                    .await
                    .map_err(write_failed)?;
                written += LINE_TERMINATOR.len();
            }
            let waiter = self.bus.arm_on_link(label, link_id)?;
            open.writer.write_all(line).await.map_err(write_failed)?;
            open.writer.flush().await.map_err(write_failed)?;
            written += line.len();
            Ok::<_, ProtocolError>(waiter)
        };
        let result = tokio::time::timeout(write_timeout, write).await;

        self.counters
            .tx_bytes
            .fetch_add(written as u64, std::sync::atomic::Ordering::Relaxed);
        match result {
            Ok(Ok(waiter)) => {
                trace!(port = %open.target, bytes = written, resync, "tx line");
                Ok(waiter)
            }
            Ok(Err(e)) => {
                warn!(port = %open.target, error = %e, "command not sent");
                Err(e)
            }
            Err(_) => Err(ProtocolError::WriteTimeout),
        }
    }
}
