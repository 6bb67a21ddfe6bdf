//! Stop-and-wait upload client.
//!
//! [`Client::upload`] delivers a file as a strict sequence of units — the
//! filename header, each ≤1024-byte chunk in file order, then the end
//! marker.  Exactly one unit is ever in flight: each is transmitted, then
//! the client blocks for the one-byte acknowledgment with a bounded wait,
//! retransmitting the same unit on timeout up to a fixed number of
//! attempts.  Exhausting the attempts aborts the whole transfer — there is
//! no partial-continuation policy.
//!
//! This is a deliberate simplification: no pipelining, no sliding window.
//! The protocol needs correctness, not throughput.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use crate::protocol::{is_ack, Frame, MAX_PAYLOAD};
use crate::socket::Socket;

/// Retry parameters for the per-unit acknowledgment loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// How long to wait for an acknowledgment before retransmitting.
    pub ack_timeout: Duration,
    /// Total transmission attempts per unit (first send included).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(2000),
            max_retries: 5,
        }
    }
}

/// Errors that abort an upload.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Local file or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file's name is not expressible on the wire.
    #[error("file has no usable name: {0}")]
    BadFileName(String),
    /// A unit went unacknowledged through every attempt.
    #[error("no acknowledgment for {unit} after {attempts} attempts")]
    RetriesExhausted {
        /// Which unit gave up (for the operator's diagnostic).
        unit: &'static str,
        attempts: u32,
    },
}

/// One-shot upload client bound to a destination server.
pub struct Client {
    socket: Socket,
    server: SocketAddr,
    config: RetryConfig,
}

impl Client {
    pub fn new(socket: Socket, server: SocketAddr, config: RetryConfig) -> Self {
        Self {
            socket,
            server,
            config,
        }
    }

    /// Upload the file at `path`, returning the total data bytes sent.
    pub async fn upload(&self, path: &Path) -> Result<u64, TransferError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::BadFileName(path.display().to_string()))?;

        let mut file = File::open(path).await?;
        let file_len = file.metadata().await?.len();

        log::info!("[client] uploading '{name}' ({file_len} bytes) to {}", self.server);

        self.send_unit(&Frame::Start(name.to_owned()).encode(), "filename header")
            .await?;

        let mut chunk = vec![0u8; MAX_PAYLOAD];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.send_unit(&chunk[..n], "data chunk").await?;
            sent += n as u64;

            let pct = if file_len == 0 {
                100.0
            } else {
                sent as f64 / file_len as f64 * 100.0
            };
            log::info!("[client] sent {sent} bytes ({pct:.2}%)");
        }

        self.send_unit(&Frame::End.encode(), "end marker").await?;
        Ok(sent)
    }

    /// Deliver one unit: transmit, await ACK, retransmit on timeout.
    async fn send_unit(&self, payload: &[u8], unit: &'static str) -> Result<(), TransferError> {
        for attempt in 1..=self.config.max_retries {
            self.socket.send_to(payload, self.server).await?;

            match timeout(self.config.ack_timeout, self.await_ack()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_elapsed) => {
                    log::debug!(
                        "[client] no ACK for {unit} (attempt {attempt}/{})",
                        self.config.max_retries
                    );
                }
            }
        }
        Err(TransferError::RetriesExhausted {
            unit,
            attempts: self.config.max_retries,
        })
    }

    /// Block until a valid acknowledgment arrives from the server.
    ///
    /// Datagrams from any other address, and non-ACK bytes, are ignored —
    /// stray traffic never consumes a retry attempt.
    async fn await_ack(&self) -> std::io::Result<()> {
        loop {
            let (buf, addr) = self.socket.recv_from().await?;
            if addr != self.server {
                continue;
            }
            if is_ack(&buf) {
                return Ok(());
            }
        }
    }
}
