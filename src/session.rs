//! Per-client transfer session: an ordered write-to-disk worker.
//!
//! Each open session owns exactly one artifact file and a bounded mpsc queue
//! of data buffers.  The dispatch loop enqueues; the session's worker task is
//! the only thing that ever touches the file, so buffers land on disk in
//! precisely the order they were enqueued even though many sessions run
//! concurrently.
//!
//! # Lifecycle
//!
//! ```text
//!  Open ──(queue sender dropped)──▶ Closing ──(queue drained)──▶ Closed
//!    │
//!    └─(no buffer for idle_timeout)─▶ discarded (artifact deleted)
//! ```
//!
//! The close signal is the channel itself: dropping the last
//! [`SessionHandle`] closes the queue, the worker drains whatever is still
//! buffered, flushes, and releases the file.  There is no timed poll loop
//! and no explicit cancellation channel.
//!
//! A session that receives nothing for `idle_timeout` assumes its client is
//! gone: it deletes the partial artifact and retires itself from the
//! registry.  `remove_if` with the session id guarantees it cannot evict a
//! successor session that has since reused the identity.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use crate::registry::SessionRegistry;

/// Registry-held handle to a running session.
///
/// Cloning shares the queue sender; dropping every clone is the close
/// signal.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    data_tx: mpsc::Sender<Vec<u8>>,
}

impl SessionHandle {
    pub(crate) fn new(id: u64, data_tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { id, data_tx }
    }

    /// The session id this handle belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue one data buffer without blocking.
    ///
    /// `Err(Full)` means the worker is behind on disk I/O; `Err(Closed)`
    /// means the worker is gone (idle-expired or write failure).  Either
    /// way the caller withholds the ACK and lets the client retry.
    pub fn enqueue(&self, buf: Vec<u8>) -> Result<(), mpsc::error::TrySendError<Vec<u8>>> {
        self.data_tx.try_send(buf)
    }
}

/// One client's in-progress upload, ready to be spawned as a worker.
pub struct TransferSession {
    id: u64,
    identity: SocketAddr,
    path: PathBuf,
    file: File,
    registry: SessionRegistry,
    idle_timeout: Duration,
}

impl TransferSession {
    pub fn new(
        id: u64,
        identity: SocketAddr,
        path: PathBuf,
        file: File,
        registry: SessionRegistry,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            id,
            identity,
            path,
            file,
            registry,
            idle_timeout,
        }
    }

    /// Spawn the write worker and return the queue handle to register.
    ///
    /// The worker first waits for a slot in `pool` — the bounded worker
    /// pool — so a saturated server queues new sessions rather than
    /// rejecting them.  Buffers accumulate in the queue meanwhile.
    pub fn spawn(self, pool: Arc<Semaphore>, queue_depth: usize) -> SessionHandle {
        let (data_tx, data_rx) = mpsc::channel(queue_depth);
        let id = self.id;
        tokio::spawn(self.run(pool, data_rx));
        SessionHandle { id, data_tx }
    }

    async fn run(self, pool: Arc<Semaphore>, mut data_rx: mpsc::Receiver<Vec<u8>>) {
        // Queue for a worker slot; enqueued buffers wait in the channel.
        let Ok(_permit) = pool.acquire_owned().await else {
            return;
        };

        let TransferSession {
            id,
            identity,
            path,
            mut file,
            registry,
            idle_timeout,
        } = self;

        let mut total: u64 = 0;

        loop {
            match timeout(idle_timeout, data_rx.recv()).await {
                // Open: next buffer in enqueue order.
                Ok(Some(buf)) => {
                    if let Err(e) = file.write_all(&buf).await {
                        log::error!("[session] {identity}: write failed, aborting: {e}");
                        return;
                    }
                    total += buf.len() as u64;
                }
                // Closing: sender dropped and queue drained.
                Ok(None) => break,
                // Idle: the client stopped talking mid-transfer.
                Err(_elapsed) => {
                    log::warn!(
                        "[session] {identity}: idle for {idle_timeout:?}, discarding '{}'",
                        path.display()
                    );
                    drop(file);
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        log::warn!("[session] {identity}: could not discard artifact: {e}");
                    }
                    registry.remove_if(&identity, id);
                    return;
                }
            }
        }

        // Closed: flush and release the artifact.
        if let Err(e) = file.flush().await {
            log::error!("[session] {identity}: flush failed: {e}");
            return;
        }
        log::info!(
            "[session] {identity}: complete, {total} bytes → '{}'",
            path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const IDLE: Duration = Duration::from_secs(5);

    fn identity(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    async fn session_in(
        dir: &std::path::Path,
        registry: &SessionRegistry,
        idle: Duration,
    ) -> (SessionHandle, PathBuf) {
        let (path, file) = crate::storage::create_unique(dir, "out.bin").await.unwrap();
        let id = registry.allocate_id();
        let session =
            TransferSession::new(id, identity(4000), path.clone(), file, registry.clone(), idle);
        let handle = session.spawn(Arc::new(Semaphore::new(1)), 8);
        registry.insert(identity(4000), handle.clone());
        (handle, path)
    }

    /// Poll until `path` holds exactly `want` bytes (bounded wait).
    async fn wait_for_len(path: &std::path::Path, want: u64) {
        for _ in 0..100 {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.len() == want {
                    return;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("file never reached {want} bytes: {}", path.display());
    }

    #[tokio::test]
    async fn buffers_are_written_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let (handle, path) = session_in(dir.path(), &registry, IDLE).await;

        handle.enqueue(b"aaaa".to_vec()).unwrap();
        handle.enqueue(b"bb".to_vec()).unwrap();
        handle.enqueue(b"cccccc".to_vec()).unwrap();
        drop(handle);
        registry.remove(&identity(4000));

        wait_for_len(&path, 12).await;
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"aaaabbcccccc");
    }

    #[tokio::test]
    async fn close_drains_queued_buffers_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let (handle, path) = session_in(dir.path(), &registry, IDLE).await;

        // Everything enqueued before the close signal must reach the file.
        for _ in 0..8 {
            handle.enqueue(vec![7u8; 100]).unwrap();
        }
        drop(handle);
        registry.remove(&identity(4000));

        wait_for_len(&path, 800).await;
    }

    #[tokio::test]
    async fn empty_session_produces_empty_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let (handle, path) = session_in(dir.path(), &registry, IDLE).await;

        drop(handle);
        registry.remove(&identity(4000));

        wait_for_len(&path, 0).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn idle_session_discards_artifact_and_retires() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let (handle, path) = session_in(dir.path(), &registry, Duration::from_millis(50)).await;

        // Send nothing; the worker must time out, delete the file, and
        // remove itself from the registry.
        for _ in 0..100 {
            if !path.exists() && registry.active() == 0 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(!path.exists());
        assert_eq!(registry.active(), 0);
        assert_eq!(registry.stats().expired, 1);
        drop(handle); // handle outlived the worker; enqueue now fails
    }

    #[tokio::test]
    async fn enqueue_after_worker_death_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let (handle, _path) = session_in(dir.path(), &registry, Duration::from_millis(50)).await;

        // Once the worker has expired, its receiver is gone and the queue
        // reports Closed.  Ok/Full just mean it has not died yet.
        for _ in 0..100 {
            if matches!(
                handle.enqueue(vec![1]),
                Err(mpsc::error::TrySendError::Closed(_))
            ) {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("worker never closed its queue");
    }
}
