//! `ChecksumQueue` (§4.2): a single-worker FIFO that computes base64-encoded
//! MD5 digests off the producer's critical path, so a burst of writes never
//! thrashes disk with concurrent reads of the same files.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ChecksumError;

struct Job {
    path: PathBuf,
    reply: oneshot::Sender<Result<String, ChecksumError>>,
}

/// Handle to the background hashing worker. Cloning shares the same queue.
#[derive(Clone)]
pub struct ChecksumQueue {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl ChecksumQueue {
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let in_flight = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let in_flight_worker = in_flight.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = hash_file(&job.path).await;
                in_flight_worker.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                let _ = job.reply.send(result);
            }
        });

        (Self { tx, in_flight }, handle)
    }

    /// Enqueue `path` for hashing and await its result. Requests are served
    /// strictly in submission order by the single worker task.
    pub async fn enqueue(&self, path: PathBuf) -> Result<String, ChecksumError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.in_flight.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.tx.send(Job { path, reply: reply_tx }).is_err() {
            self.in_flight.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return Err(ChecksumError::QueueClosed);
        }
        reply_rx.await.unwrap_or(Err(ChecksumError::QueueClosed))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(std::sync::atomic::Ordering::SeqCst)
    }
}

async fn hash_file(path: &std::path::Path) -> Result<String, ChecksumError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut ctx = md5::Context::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|source| ChecksumError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }

    Ok(BASE64.encode(ctx.compute().0))
}
