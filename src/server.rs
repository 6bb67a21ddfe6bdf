//! Server dispatch loop.
//!
//! The [`Server`] owns the socket, the [`SessionRegistry`], and the bounded
//! worker pool.  [`Server::run`] perpetually receives one datagram at a
//! time, classifies it (see [`crate::protocol::Frame`]), and routes it
//! synchronously before receiving the next:
//!
//! - **start** — resolve a unique artifact name (this task is the single
//!   resolution point), install a new session, spawn its worker, ACK.  An
//!   open session under the same identity is drained and replaced.
//! - **end** — remove the session if present, signal it to drain and close,
//!   ACK whether or not a session existed.
//! - **data** — enqueue on the open session and ACK; with no open session
//!   the payload is dropped and *not* acknowledged — the client's retry
//!   loop is the recovery path.
//!
//! The loop never writes to an artifact itself; all file writing is deferred
//! to each session's worker so datagram intake keeps up under concurrent
//! clients.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Semaphore;

use crate::protocol::Frame;
use crate::registry::SessionRegistry;
use crate::session::TransferSession;
use crate::socket::Socket;

/// Tunable server parameters.
pub struct ServerConfig {
    /// Directory where artifacts are written (created if missing).
    pub output_dir: PathBuf,
    /// Maximum simultaneously active session workers.
    pub max_workers: usize,
    /// Per-session queue depth (buffers awaiting the worker).
    pub queue_depth: usize,
    /// A session receiving nothing for this long is discarded.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_workers: 8,
            queue_depth: 64,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors fatal to the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport send/receive failure.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The upload server: dispatch loop plus its collaborators.
pub struct Server {
    socket: Socket,
    registry: SessionRegistry,
    pool: Arc<Semaphore>,
    config: ServerConfig,
}

impl Server {
    /// Bind the server socket and prepare the output directory.
    pub async fn bind(addr: SocketAddr, config: ServerConfig) -> io::Result<Self> {
        tokio::fs::create_dir_all(&config.output_dir).await?;
        let socket = Socket::bind(addr).await?;
        Ok(Self {
            socket,
            registry: SessionRegistry::new(),
            pool: Arc::new(Semaphore::new(config.max_workers)),
            config,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// The session registry (counters are useful for diagnostics and tests).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Receive and route datagrams forever.
    ///
    /// Returns only on a transport error, which is fatal for the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        log::info!("[server] listening on {}", self.socket.local_addr);

        loop {
            let (buf, peer) = self.socket.recv_from().await?;
            match Frame::classify(&buf) {
                Ok(Frame::Start(name)) => self.handle_start(peer, &name).await?,
                Ok(Frame::End) => self.handle_end(peer).await?,
                Ok(Frame::Data(payload)) => self.handle_data(peer, payload).await?,
                Err(e) => {
                    log::debug!("[server] dropping malformed control frame from {peer}: {e}")
                }
            }
        }
    }

    async fn handle_start(&self, peer: SocketAddr, name: &str) -> Result<(), ServerError> {
        let (path, file) = match crate::storage::create_unique(&self.config.output_dir, name).await
        {
            Ok(v) => v,
            Err(e) => {
                // Unusable name or full disk: no session, no ACK.
                log::warn!("[server] cannot create artifact '{name}' for {peer}: {e}");
                return Ok(());
            }
        };

        let id = self.registry.allocate_id();
        let session = TransferSession::new(
            id,
            peer,
            path.clone(),
            file,
            self.registry.clone(),
            self.config.idle_timeout,
        );
        let handle = session.spawn(self.pool.clone(), self.config.queue_depth);

        if let Some(old) = self.registry.insert(peer, handle) {
            // Drain-then-replace: dropping the displaced handle closes its
            // queue, so the old worker drains and finalises its artifact.
            log::info!("[server] {peer}: new start replaces open session {}", old.id());
        }

        self.socket.send_ack(peer).await?;
        log::info!("[server] {peer}: session started, saving as '{}'", path.display());
        Ok(())
    }

    async fn handle_end(&self, peer: SocketAddr) -> Result<(), ServerError> {
        match self.registry.remove(&peer) {
            Some(handle) => {
                // Close signal: the worker drains the queue, flushes, and
                // logs its final byte count.
                drop(handle);
                log::info!("[server] {peer}: transfer complete");
            }
            None => log::debug!("[server] {peer}: end marker with no open session"),
        }
        // The end marker is ACKed regardless, so a retransmitted end after
        // a lost ACK is idempotent.
        self.socket.send_ack(peer).await?;
        Ok(())
    }

    async fn handle_data(&self, peer: SocketAddr, payload: Vec<u8>) -> Result<(), ServerError> {
        let Some(handle) = self.registry.get(&peer) else {
            log::debug!("[server] {peer}: data with no open session, dropped");
            return Ok(());
        };

        match handle.enqueue(payload) {
            Ok(()) => self.socket.send_ack(peer).await?,
            Err(TrySendError::Full(_)) => {
                // Worker is behind on disk; withholding the ACK makes the
                // client retransmit this chunk later.
                log::debug!("[server] {peer}: session queue full, chunk dropped");
            }
            Err(TrySendError::Closed(_)) => {
                // Worker died (idle expiry or write failure); retire the
                // stale entry so a later start can reuse the identity.
                self.registry.remove_if(&peer, handle.id());
                log::debug!("[server] {peer}: session worker gone, chunk dropped");
            }
        }
        Ok(())
    }
}
