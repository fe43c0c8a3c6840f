//! Zero-copy datagram path with checksum trailers and bounded retry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use vram_core::{PoolError, RemoteHandle, Result};

use crate::frame::{MAX_DATAGRAM_PAYLOAD, encode_frame};

/// Retry bounds for unreliable sends.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per frame before giving up.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// An unreliable datagram link to one node's data-plane endpoint.
pub trait DatagramLink: Send + Sync {
    /// Sends one encoded frame.
    fn send(&self, frame: Vec<u8>) -> BoxFuture<'_, Result<()>>;
}

/// [`DatagramLink`] over a connected UDP socket.
#[derive(Debug)]
pub struct UdpDatagramLink {
    socket: UdpSocket,
}

impl UdpDatagramLink {
    /// Binds an ephemeral local socket and connects it to the target.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TransferFailed`] if the socket cannot be set up.
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().map_err(|e| PoolError::TransferFailed {
                attempts: vec![format!("datagram bind: {e}")],
            })?
        } else {
            "[::]:0".parse().map_err(|e| PoolError::TransferFailed {
                attempts: vec![format!("datagram bind: {e}")],
            })?
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| PoolError::TransferFailed {
                attempts: vec![format!("datagram bind: {e}")],
            })?;
        socket
            .connect(target)
            .await
            .map_err(|e| PoolError::TransferFailed {
                attempts: vec![format!("datagram connect {target}: {e}")],
            })?;
        Ok(Self { socket })
    }
}

impl DatagramLink for UdpDatagramLink {
    fn send(&self, frame: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.socket
                .send(&frame)
                .await
                .map_err(|e| PoolError::TransferFailed {
                    attempts: vec![format!("datagram send: {e}")],
                })?;
            Ok(())
        })
    }
}

/// Datagram transfer path: chunks a buffer into checksummed frames and
/// sends each with bounded retry.
///
/// Datagrams only carry writes; reads go over RDMA or the stream fallback.
pub struct DatagramPath {
    link: Arc<dyn DatagramLink>,
    retry: RetryPolicy,
}

impl DatagramPath {
    /// Creates a path over the given link.
    #[must_use]
    pub fn new(link: Arc<dyn DatagramLink>, retry: RetryPolicy) -> Self {
        Self { link, retry }
    }

    /// Sends `buf` to the allocation behind `handle`, one frame per chunk.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TransferFailed`] once a chunk exhausts its
    /// retry budget; earlier chunks may already have been delivered.
    pub async fn send_buffer(&self, handle: RemoteHandle, buf: &[u8]) -> Result<()> {
        let chunks: Vec<(u64, &[u8])> = if buf.is_empty() {
            vec![(0, &buf[..])]
        } else {
            buf.chunks(MAX_DATAGRAM_PAYLOAD)
                .enumerate()
                .map(|(i, chunk)| ((i * MAX_DATAGRAM_PAYLOAD) as u64, chunk))
                .collect()
        };

        for (offset, chunk) in chunks {
            self.send_chunk(handle, offset, chunk).await?;
        }
        debug!(%handle, bytes = buf.len(), "datagram transfer complete");
        Ok(())
    }

    async fn send_chunk(&self, handle: RemoteHandle, offset: u64, chunk: &[u8]) -> Result<()> {
        let frame = encode_frame(handle, offset, chunk);
        let mut attempts = Vec::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.link.send(frame.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(%handle, offset, attempt, error = %e, "datagram send failed");
                    attempts.push(format!("datagram attempt {attempt}: {e}"));
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        Err(PoolError::TransferFailed { attempts })
    }
}

impl std::fmt::Debug for DatagramPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramPath")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
